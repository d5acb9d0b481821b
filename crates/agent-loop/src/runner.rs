use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{pin_mut, Stream, StreamExt};
use serde_json::json;
use uuid::Uuid;

use agent_core::{
    ActionCall, AgentError, AgentEvent, AgentType, Message, RunArgs, ToolRegistry, Value,
    FINAL_ANSWER_TOOL,
};
use agent_llm::{InvokeOptions, LLMEngine};
use agent_metrics::Monitor;

use crate::config::{AgentConfig, MaxIterationsPolicy};
use crate::parser::{
    ActionContext, CodeActionParser, JsonActionParser, ParsedAction, ResponseParser, RunState,
    StepOutcome,
};
use crate::prompts::{render_system_prompt, MAX_ITERATIONS_PROMPT};
use crate::step::StepLog;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Where the loop stands.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    /// No run started yet
    Idle,
    Running { iteration: usize },
    Done(AgentType),
    Failed(AgentError),
}

/// A task-driven engine loop with tool calls.
///
/// The response format is fixed at construction through the parser. The
/// [`Monitor`] belongs to the agent and keeps accumulating across runs unless
/// [`AgentConfig::reset_monitor_each_run`] is set or it is reset by hand.
pub struct Agent {
    engine: Arc<dyn LLMEngine>,
    parser: Box<dyn ResponseParser>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    monitor: Monitor,
    logs: Vec<StepLog>,
    state: AgentState,
    variables: RunState,
    run_id: String,
    task: String,
}

impl Agent {
    pub fn new(
        engine: Arc<dyn LLMEngine>,
        parser: Box<dyn ResponseParser>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            engine,
            parser,
            tools,
            config: AgentConfig::default(),
            monitor: Monitor::new(),
            logs: Vec::new(),
            state: AgentState::Idle,
            variables: RunState::new(),
            run_id: String::new(),
            task: String::new(),
        }
    }

    /// Agent whose actions are JSON blobs.
    pub fn json(engine: Arc<dyn LLMEngine>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(engine, Box::new(JsonActionParser::new()), tools)
    }

    /// Agent whose actions are Python snippets run in the sandbox.
    pub fn code(engine: Arc<dyn LLMEngine>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(engine, Box::new(CodeActionParser::new()), tools)
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut Monitor {
        &mut self.monitor
    }

    /// Step logs of the current (or last) run.
    pub fn logs(&self) -> &[StepLog] {
        &self.logs
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn system_prompt(&self) -> String {
        let template = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| self.parser.default_system_prompt());
        render_system_prompt(template, &self.tools.list_tools())
    }

    /// Runs `task` to completion and returns the final answer.
    pub async fn run(&mut self, task: &str, args: RunArgs) -> Result<AgentType> {
        let events = self.stream_run(task, args);
        pin_mut!(events);

        let mut answer = None;
        while let Some(event) = events.next().await {
            if let AgentEvent::FinalAnswer { answer: value } = event? {
                answer = Some(value);
            }
        }

        answer.ok_or_else(|| AgentError::Execution("run ended without a final answer".to_string()))
    }

    /// Runs `task`, yielding progress as it happens.
    ///
    /// A failed run yields its error as the last item.
    pub fn stream_run<'a>(
        &'a mut self,
        task: &str,
        args: RunArgs,
    ) -> impl Stream<Item = Result<AgentEvent>> + 'a {
        let task = task.to_string();
        let agent = self;

        stream! {
            agent.start_run(&task, args);
            let system_prompt = agent.system_prompt();
            let max_iterations = agent.config.max_iterations;

            for iteration in 0..max_iterations {
                agent.state = AgentState::Running { iteration };
                yield Ok(AgentEvent::StepStarted { iteration });

                let (step, result) = agent.execute_step(iteration, &system_prompt).await;
                for event in step_events(&step) {
                    yield Ok(event);
                }
                agent.logs.push(step);

                match result {
                    Ok(Some(answer)) => {
                        log::info!("[{}] Final answer: {}", agent.run_id, answer);
                        agent.state = AgentState::Done(answer.clone());
                        yield Ok(AgentEvent::FinalAnswer { answer });
                        return;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        log::error!("[{}] Run failed at step {}: {}", agent.run_id, iteration, error);
                        agent.state = AgentState::Failed(error.clone());
                        yield Err(error);
                        return;
                    }
                }
            }

            log::warn!(
                "[{}] Reached max iterations ({}) without a final answer",
                agent.run_id,
                max_iterations
            );
            yield Ok(AgentEvent::MaxIterationsReached { max_iterations });

            match agent.answer_after_max_iterations(&system_prompt).await {
                Ok(answer) => {
                    agent.state = AgentState::Done(answer.clone());
                    yield Ok(AgentEvent::FinalAnswer { answer });
                }
                Err(error) => {
                    log::error!("[{}] Run failed: {}", agent.run_id, error);
                    agent.state = AgentState::Failed(error.clone());
                    yield Err(error);
                }
            }
        }
    }

    fn start_run(&mut self, task: &str, args: RunArgs) {
        self.run_id = Uuid::new_v4().to_string();
        self.logs.clear();
        self.variables.clear();
        if self.config.reset_monitor_each_run {
            self.monitor.reset();
        }

        self.task = task.to_string();
        if !args.is_empty() {
            let described: BTreeMap<&String, String> = args
                .iter()
                .map(|(name, value)| (name, value.to_display_string()))
                .collect();
            self.task.push_str(&format!(
                "\nYou have been provided with these initial arguments: {}.",
                serde_json::to_string(&described).unwrap_or_default()
            ));
        }
        for (name, value) in args {
            self.variables.insert(name, Value::from_agent(value));
        }

        self.state = AgentState::Running { iteration: 0 };
        log::info!(
            "[{}] Starting {} agent run: {}",
            self.run_id,
            self.parser.name(),
            self.task
        );
    }

    /// System prompt, the task, then every finished step of this run.
    fn memory(&self, system_prompt: &str) -> Vec<Message> {
        let mut messages = vec![
            Message::system(system_prompt),
            Message::user(format!("Task: {}", self.task)),
        ];
        for step in &self.logs {
            messages.extend(step.to_memory());
        }
        messages
    }

    fn invoke_options(&self) -> InvokeOptions {
        InvokeOptions::default().with_stop_sequences(self.config.stop_sequences.clone())
    }

    async fn execute_step(
        &mut self,
        iteration: usize,
        system_prompt: &str,
    ) -> (StepLog, Result<Option<AgentType>>) {
        let mut step = StepLog::start(iteration, self.memory(system_prompt));
        let result = self.perform_step(&mut step).await;
        step.finish();

        let duration = Duration::from_millis(step.duration_ms.unwrap_or_default());
        step.usage = self
            .monitor
            .record_step(self.engine.as_ref(), iteration, duration)
            .usage;

        match &result {
            Ok(Some(answer)) => step.final_answer = Some(answer.clone()),
            Ok(None) => {}
            Err(error) => step.error = Some(error.to_string()),
        }

        (step, result)
    }

    async fn perform_step(&mut self, step: &mut StepLog) -> Result<Option<AgentType>> {
        log::debug!(
            "[{}] Step {}: sending {} messages",
            self.run_id,
            step.iteration,
            step.prompt.len()
        );

        let output = self
            .engine
            .invoke(&step.prompt, &self.invoke_options())
            .await
            .map_err(|error| AgentError::Generation(error.to_string()))?;
        log::debug!("[{}] Model output:\n{}", self.run_id, output);
        step.model_output = Some(output.clone());

        let parsed = self.parser.parse(&output)?;
        if !parsed.rationale.is_empty() {
            step.rationale = Some(parsed.rationale);
        }

        match parsed.action {
            ParsedAction::FinalAnswer(payload) => {
                step.action = Some(ActionCall::new(
                    FINAL_ANSWER_TOOL,
                    json!({ "answer": payload.clone() }),
                ));
                Ok(Some(
                    self.parser.resolve_final_answer(payload, &self.variables),
                ))
            }
            ParsedAction::Call(call) => {
                log::debug!("[{}] Calling '{}' with {}", self.run_id, call.name, call.input);
                step.action = Some(call.clone());

                let outcome = self
                    .parser
                    .execute(
                        &call,
                        ActionContext {
                            tools: &self.tools,
                            state: &mut self.variables,
                            max_observation_len: self.config.max_observation_len,
                        },
                    )
                    .await?;

                match outcome {
                    StepOutcome::Observation(observation) => {
                        log::debug!("[{}] Observation:\n{}", self.run_id, observation);
                        step.observation = Some(observation);
                        Ok(None)
                    }
                    StepOutcome::FinalAnswer(answer) => Ok(Some(answer)),
                }
            }
        }
    }

    async fn answer_after_max_iterations(&mut self, system_prompt: &str) -> Result<AgentType> {
        let text = match &self.config.max_iterations_policy {
            MaxIterationsPolicy::Sentinel(text) => return Ok(AgentType::text(text.clone())),
            MaxIterationsPolicy::AskEngine => {
                let mut prompt = self.memory(system_prompt);
                prompt.push(Message::user(MAX_ITERATIONS_PROMPT));

                let started = std::time::Instant::now();
                let result = self.engine.invoke(&prompt, &InvokeOptions::default()).await;
                self.monitor.record_step(
                    self.engine.as_ref(),
                    self.config.max_iterations,
                    started.elapsed(),
                );

                result.map_err(|error| AgentError::Generation(error.to_string()))?
            }
        };

        Ok(AgentType::text(text.trim()))
    }
}

/// Events describing a finished step, in the order things happened.
fn step_events(step: &StepLog) -> Vec<AgentEvent> {
    let iteration = step.iteration;
    let mut events = Vec::new();

    if let Some(content) = &step.model_output {
        events.push(AgentEvent::ModelOutput {
            iteration,
            content: content.clone(),
        });
    }
    if let Some(call) = &step.action {
        events.push(AgentEvent::ToolCall {
            iteration,
            call: call.clone(),
        });
    }
    if let Some(content) = &step.observation {
        events.push(AgentEvent::Observation {
            iteration,
            content: content.clone(),
        });
    }
    events.push(AgentEvent::StepFinished {
        iteration,
        duration_ms: step.duration_ms.unwrap_or_default(),
        usage: step.usage,
    });

    events
}
