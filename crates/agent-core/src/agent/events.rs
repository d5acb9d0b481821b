use serde::{Deserialize, Serialize};

use crate::agent::types::{ActionCall, AgentType};

/// Step-by-step progress of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted {
        iteration: usize,
    },

    /// Raw text returned by the engine for this step
    ModelOutput {
        iteration: usize,
        content: String,
    },

    ToolCall {
        iteration: usize,
        call: ActionCall,
    },

    Observation {
        iteration: usize,
        content: String,
    },

    StepFinished {
        iteration: usize,
        duration_ms: u64,
        usage: TokenUsage,
    },

    /// The iteration budget ran out before the model produced an answer
    MaxIterationsReached {
        max_iterations: usize,
    },

    FinalAnswer {
        answer: AgentType,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn add_assign(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}
