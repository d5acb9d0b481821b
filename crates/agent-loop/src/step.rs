use agent_core::{ActionCall, AgentType, Message, TokenUsage};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Record of one engine round-trip and what came of it.
#[derive(Debug, Clone, Serialize)]
pub struct StepLog {
    pub iteration: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Messages sent to the engine for this step
    pub prompt: Vec<Message>,
    pub model_output: Option<String>,
    pub rationale: Option<String>,
    pub action: Option<ActionCall>,
    pub observation: Option<String>,
    pub final_answer: Option<AgentType>,
    pub error: Option<String>,
    pub usage: TokenUsage,
}

impl StepLog {
    pub fn start(iteration: usize, prompt: Vec<Message>) -> Self {
        Self {
            iteration,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            prompt,
            model_output: None,
            rationale: None,
            action: None,
            observation: None,
            final_answer: None,
            error: None,
            usage: TokenUsage::default(),
        }
    }

    pub fn finish(&mut self) {
        let finished_at = Utc::now();
        let elapsed = (finished_at - self.started_at).num_milliseconds().max(0);
        self.finished_at = Some(finished_at);
        self.duration_ms = Some(u64::try_from(elapsed).unwrap_or_default());
    }

    /// Messages this step contributes to the next prompt.
    pub fn to_memory(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(output) = &self.model_output {
            messages.push(Message::assistant(output.trim()));
        }
        if let Some(observation) = &self.observation {
            messages.push(Message::user(format!(
                "[OUTPUT OF STEP {}] -> Observation:\n{}",
                self.iteration, observation
            )));
        }
        messages
    }
}
