//! Turning raw model output into actions, and running those actions.
//!
//! Two formats are supported. [`JsonActionParser`] expects a JSON blob with
//! `action` / `action_input`; [`CodeActionParser`] expects a fenced Python
//! block that is evaluated in the sandbox. The format is picked when the
//! agent is built.

mod code;
mod json;

use std::collections::HashMap;

use agent_core::{ActionCall, AgentError, AgentType, ToolRegistry, Value};
use async_trait::async_trait;
use thiserror::Error;

pub use code::{CodeActionParser, PYTHON_INTERPRETER_TOOL};
pub use json::JsonActionParser;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in output: {0}")]
    MissingJson(String),

    #[error("invalid JSON in output: {0}")]
    InvalidJson(String),

    #[error("key '{0}' is missing from the action blob")]
    MissingKey(&'static str),

    #[error("no ```py code block found in output")]
    MissingCode,
}

impl From<ParseError> for AgentError {
    fn from(error: ParseError) -> Self {
        Self::Parsing(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAction {
    Call(ActionCall),
    FinalAnswer(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// Text before the action marker; empty when there is none
    pub rationale: String,
    pub action: ParsedAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Observation(String),
    FinalAnswer(AgentType),
}

/// Named values visible to actions during one run.
pub type RunState = HashMap<String, Value>;

/// Everything an action may touch while it executes.
pub struct ActionContext<'a> {
    pub tools: &'a ToolRegistry,
    pub state: &'a mut RunState,
    pub max_observation_len: usize,
}

#[async_trait]
pub trait ResponseParser: Send + Sync {
    /// Short label used in logs and the CLI
    fn name(&self) -> &'static str;

    /// Template with a `{{tool_descriptions}}` placeholder.
    fn default_system_prompt(&self) -> &'static str;

    fn parse(&self, raw: &str) -> Result<ParsedResponse, ParseError>;

    async fn execute(
        &self,
        call: &ActionCall,
        ctx: ActionContext<'_>,
    ) -> Result<StepOutcome, AgentError>;

    /// Maps a parsed `final_answer` payload to the value the run returns.
    ///
    /// A string naming a state entry resolves to that entry.
    fn resolve_final_answer(&self, answer: serde_json::Value, state: &RunState) -> AgentType {
        if let serde_json::Value::String(name) = &answer {
            if let Some(value) = state.get(name) {
                return value.clone().into_agent();
            }
        }
        AgentType::from_json(answer)
    }
}

/// Splits `raw` at the last `marker`; without one the whole text is the action.
pub(crate) fn split_rationale<'a>(raw: &'a str, marker: &str) -> (&'a str, &'a str) {
    match raw.rfind(marker) {
        Some(index) => (raw[..index].trim(), &raw[index + marker.len()..]),
        None => ("", raw),
    }
}

/// Cuts `text` to at most `max_len` characters, keeping both ends.
pub fn truncate_observation(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        return text.to_string();
    }

    let half = max_len / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(len - half).collect();
    format!(
        "{head}\n..._This content has been truncated to stay below {max_len} characters_...\n{tail}"
    )
}
