pub mod engine;
pub mod openai;

pub use engine::{InvokeOptions, LLMEngine, LLMError, LastCallUsage, Result};
pub use openai::OpenAIEngine;
