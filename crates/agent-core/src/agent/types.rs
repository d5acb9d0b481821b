use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "generate_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }
}

/// A requested tool invocation parsed out of model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionCall {
    pub name: String,
    pub input: serde_json::Value,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// Typed value flowing out of tools and final answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentType {
    Text { value: String },
    Image { path: String },
    Audio { path: String },
    Json { value: serde_json::Value },
}

impl AgentType {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn image(path: impl Into<String>) -> Self {
        Self::Image { path: path.into() }
    }

    pub fn audio(path: impl Into<String>) -> Self {
        Self::Audio { path: path.into() }
    }

    /// Strings become `Text`, everything else is kept as JSON.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text { value: text },
            other => Self::Json { value: other },
        }
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Self::Image { .. } => Some("image/png"),
            Self::Audio { .. } => Some("audio/wav"),
            Self::Text { .. } | Self::Json { .. } => None,
        }
    }

    /// File-backed values (images, audio) expose their path.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            Self::Image { path } | Self::Audio { path } => Some(path),
            Self::Text { .. } | Self::Json { .. } => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Self::Text { value } => value.clone(),
            Self::Image { path } | Self::Audio { path } => path.clone(),
            Self::Json { value } => value.to_string(),
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Additional named arguments handed to a run; they seed the run state.
pub type RunArgs = HashMap<String, AgentType>;

/// Exposes the token counts of the most recent engine call.
///
/// Both values describe exactly one call; they are overwritten by the next
/// call and never accumulate.
pub trait TokenCounter {
    fn last_input_token_count(&self) -> u64;
    fn last_output_token_count(&self) -> u64;
}
