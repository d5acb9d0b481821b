use thiserror::Error;

use crate::sandbox::InterpreterError;
use crate::tools::ToolError;

/// Recoverable, user-facing failure of an agent step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Error in generating model output: {0}")]
    Generation(String),

    #[error("Could not parse model output: {0}")]
    Parsing(String),

    #[error("Error executing action: {0}")]
    Execution(String),
}

impl AgentError {
    /// The payload without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Generation(message) | Self::Parsing(message) | Self::Execution(message) => {
                message
            }
        }
    }
}

impl From<ToolError> for AgentError {
    fn from(error: ToolError) -> Self {
        Self::Execution(error.to_string())
    }
}

impl From<InterpreterError> for AgentError {
    fn from(error: InterpreterError) -> Self {
        Self::Execution(error.to_string())
    }
}
