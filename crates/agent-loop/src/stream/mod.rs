//! Relaying agent runs to a UI as display-ready messages.

pub mod message;
pub mod relay;

pub use message::{MessageMetadata, StreamContent, StreamMessage};
pub use relay::{stream_to_ui, StreamOptions};
