use agent_core::{Message, TokenCounter};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{InvokeOptions, LLMEngine, LLMError, LastCallUsage, Result};

/// Non-streaming client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAIEngine {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    usage: LastCallUsage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAIEngine {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            usage: LastCallUsage::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, messages: &[Message], options: &InvokeOptions) -> Value {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
        });

        if !options.stop_sequences.is_empty() {
            body["stop"] = json!(options.stop_sequences);
        }

        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        body
    }

    async fn request(&self, messages: &[Message], options: &InvokeOptions) -> Result<String> {
        let body = self.build_body(messages, options);
        log::debug!(
            "OpenAI engine sending {} messages to '{}'",
            messages.len(),
            body["model"]
        );

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(LLMError::Api(format!("HTTP {}: {}", status, text)));
        }

        let completion: ChatCompletion = serde_json::from_str(&response.text().await?)?;
        let usage = completion.usage.unwrap_or_default();
        self.usage.set(usage.prompt_tokens, usage.completion_tokens);

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LLMError::EmptyResponse("no choices in completion".to_string()))
    }
}

impl TokenCounter for OpenAIEngine {
    fn last_input_token_count(&self) -> u64 {
        self.usage.input()
    }

    fn last_output_token_count(&self) -> u64 {
        self.usage.output()
    }
}

#[async_trait]
impl LLMEngine for OpenAIEngine {
    async fn invoke(&self, messages: &[Message], options: &InvokeOptions) -> Result<String> {
        self.usage.clear();
        let result = self.request(messages, options).await;
        if let Err(error) = &result {
            log::warn!("OpenAI engine call failed: {}", error);
        }
        result
    }
}
