use std::sync::atomic::{AtomicU64, Ordering};

use agent_core::{Message, TokenCounter};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// Per-call options forwarded to the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeOptions {
    /// Sequences at which generation stops; not included in the output
    pub stop_sequences: Vec<String>,
    pub max_tokens: Option<u32>,
    /// Optional model override
    pub model: Option<String>,
}

impl InvokeOptions {
    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A language model the agent loop can call.
///
/// After `invoke` returns, the [`TokenCounter`] methods report the counts of
/// that call only. Errors propagate unchanged; engines do not retry.
#[async_trait]
pub trait LLMEngine: TokenCounter + Send + Sync {
    async fn invoke(&self, messages: &[Message], options: &InvokeOptions) -> Result<String>;
}

/// Last-call counters for engines that are shared behind `Arc`.
#[derive(Debug, Default)]
pub struct LastCallUsage {
    input: AtomicU64,
    output: AtomicU64,
}

impl LastCallUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites both counters with the counts of the call that just ended.
    pub fn set(&self, input_tokens: u64, output_tokens: u64) {
        self.input.store(input_tokens, Ordering::SeqCst);
        self.output.store(output_tokens, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.set(0, 0);
    }

    pub fn input(&self) -> u64 {
        self.input.load(Ordering::SeqCst)
    }

    pub fn output(&self) -> u64 {
        self.output.load(Ordering::SeqCst)
    }
}

impl TokenCounter for LastCallUsage {
    fn last_input_token_count(&self) -> u64 {
        self.input()
    }

    fn last_output_token_count(&self) -> u64 {
        self.output()
    }
}
