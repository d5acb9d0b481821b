use agent_core::{AgentType, Role};
use serde::{Deserialize, Serialize};

/// Payload of a relayed message: plain text or a file on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StreamContent {
    File {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Text(String),
}

impl StreamContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::File { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageMetadata {
    pub title: String,
}

/// Display-ready message handed to a UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamMessage {
    pub role: Role,
    pub content: StreamContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl StreamMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: StreamContent::Text(content.into()),
            metadata: None,
        }
    }

    /// File message for image and audio values; `None` for anything else.
    pub fn file(value: &AgentType) -> Option<Self> {
        let path = value.file_path()?;
        Some(Self {
            role: Role::Assistant,
            content: StreamContent::File {
                path: path.to_string(),
                mime_type: value.mime_type().map(String::from),
            },
            metadata: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata = Some(MessageMetadata {
            title: title.into(),
        });
        self
    }
}
