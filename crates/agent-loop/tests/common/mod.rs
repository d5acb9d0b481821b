#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use agent_core::{Message, TokenCounter};
use agent_llm::{InvokeOptions, LLMEngine, LLMError, LastCallUsage};
use async_trait::async_trait;

/// Replays canned outputs and reports 10 input / 20 output tokens per call.
pub struct FakeEngine {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    usage: LastCallUsage,
}

impl FakeEngine {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            usage: LastCallUsage::new(),
        }
    }

    /// Always answers with `output`.
    pub fn replying(output: &str) -> Self {
        Self::new(vec![Ok(output.to_string())])
    }

    pub fn failing(message: &str) -> Self {
        Self::new(vec![Err(message.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, call: usize) -> Vec<Message> {
        self.prompts.lock().unwrap()[call].clone()
    }
}

impl TokenCounter for FakeEngine {
    fn last_input_token_count(&self) -> u64 {
        self.usage.input()
    }

    fn last_output_token_count(&self) -> u64 {
        self.usage.output()
    }
}

#[async_trait]
impl LLMEngine for FakeEngine {
    async fn invoke(&self, messages: &[Message], _options: &InvokeOptions) -> Result<String, LLMError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.usage.set(10, 20);

        let mut responses = self.responses.lock().unwrap();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };

        match next {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(LLMError::Api(message)),
            None => Ok(String::new()),
        }
    }
}
