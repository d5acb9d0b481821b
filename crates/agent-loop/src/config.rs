/// What the loop does when `max_iterations` steps pass without a final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaxIterationsPolicy {
    /// Finish with this text as the answer.
    Sentinel(String),
    /// Make one more engine call asking for a best-effort answer from the step history.
    AskEngine,
}

impl Default for MaxIterationsPolicy {
    fn default() -> Self {
        Self::Sentinel(DEFAULT_MAX_ITERATIONS_ANSWER.to_string())
    }
}

pub const DEFAULT_MAX_ITERATIONS_ANSWER: &str = "Reached max iterations.";

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// Replaces the parser's default system prompt; `{{tool_descriptions}}` is still expanded.
    pub system_prompt: Option<String>,
    pub max_iterations_policy: MaxIterationsPolicy,
    /// Clear the monitor totals at the start of every run instead of accumulating.
    pub reset_monitor_each_run: bool,
    pub stop_sequences: Vec<String>,
    /// Observations longer than this many characters are cut.
    pub max_observation_len: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            system_prompt: None,
            max_iterations_policy: MaxIterationsPolicy::default(),
            reset_monitor_each_run: false,
            stop_sequences: vec!["<end_action>".to_string(), "Observation:".to_string()],
            max_observation_len: 50_000,
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_iterations_policy(mut self, policy: MaxIterationsPolicy) -> Self {
        self.max_iterations_policy = policy;
        self
    }

    pub fn with_reset_monitor_each_run(mut self, reset: bool) -> Self {
        self.reset_monitor_each_run = reset;
        self
    }
}
