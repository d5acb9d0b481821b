use agent_core::{execute_action, ActionCall, AgentError, AgentType, Value, FINAL_ANSWER_TOOL};
use async_trait::async_trait;

use super::{
    split_rationale, truncate_observation, ActionContext, ParseError, ParsedAction,
    ParsedResponse, ResponseParser, StepOutcome,
};
use crate::prompts::JSON_SYSTEM_PROMPT;

const ACTION_MARKER: &str = "Action:";

/// Actions written as `{"action": ..., "action_input": ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonActionParser;

impl JsonActionParser {
    pub fn new() -> Self {
        Self
    }
}

fn extract_json_blob(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(ParseError::MissingJson(text.trim().to_string())),
    }
}

fn final_answer_payload(input: serde_json::Value) -> Result<serde_json::Value, ParseError> {
    match input {
        serde_json::Value::Object(mut fields) => {
            fields.remove("answer").ok_or(ParseError::MissingKey("answer"))
        }
        other => Ok(other),
    }
}

/// State key under which a file-backed tool output is kept.
fn memory_key(value: &AgentType) -> Option<&'static str> {
    match value {
        AgentType::Image { .. } => Some("image.png"),
        AgentType::Audio { .. } => Some("audio.wav"),
        AgentType::Text { .. } | AgentType::Json { .. } => None,
    }
}

#[async_trait]
impl ResponseParser for JsonActionParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn default_system_prompt(&self) -> &'static str {
        JSON_SYSTEM_PROMPT
    }

    fn parse(&self, raw: &str) -> Result<ParsedResponse, ParseError> {
        let (rationale, action_text) = split_rationale(raw, ACTION_MARKER);
        let blob = extract_json_blob(action_text)?;

        let mut parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(blob).map_err(|error| ParseError::InvalidJson(error.to_string()))?;

        let action = parsed
            .remove("action")
            .and_then(|value| value.as_str().map(|name| name.trim().to_string()))
            .ok_or(ParseError::MissingKey("action"))?;
        let input = parsed
            .remove("action_input")
            .ok_or(ParseError::MissingKey("action_input"))?;

        let action = if action == FINAL_ANSWER_TOOL {
            ParsedAction::FinalAnswer(final_answer_payload(input)?)
        } else {
            ParsedAction::Call(ActionCall::new(action, input))
        };

        Ok(ParsedResponse {
            rationale: rationale.to_string(),
            action,
        })
    }

    async fn execute(
        &self,
        call: &ActionCall,
        ctx: ActionContext<'_>,
    ) -> Result<StepOutcome, AgentError> {
        let output = execute_action(call, ctx.tools).await.map_err(|error| {
            match ctx.tools.get(&call.name) {
                Some(tool) => AgentError::Execution(format!(
                    "{}\nAs a reminder, this tool's description is: {}",
                    error,
                    tool.description()
                )),
                None => error.into(),
            }
        })?;

        if let Some(key) = memory_key(&output) {
            log::debug!("storing output of '{}' as '{}'", call.name, key);
            ctx.state.insert(key.to_string(), Value::Media(output));
            return Ok(StepOutcome::Observation(format!("Stored '{key}' in memory.")));
        }

        Ok(StepOutcome::Observation(truncate_observation(
            &output.to_display_string(),
            ctx.max_observation_len,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agent_core::{Tool, ToolError, ToolRegistry};
    use serde_json::json;

    use super::*;
    use crate::parser::RunState;

    struct WeatherTool;

    #[async_trait]
    impl Tool for WeatherTool {
        fn name(&self) -> &str {
            "weather"
        }

        fn description(&self) -> &str {
            "Gets the weather for a city"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            })
        }

        async fn execute(&self, args: serde_json::Value) -> Result<AgentType, ToolError> {
            match args["city"].as_str() {
                Some("Paris") => Ok(AgentType::text("sunny")),
                Some(other) => Err(ToolError::Execution(format!("no data for {other}"))),
                None => Err(ToolError::InvalidArguments("city is required".to_string())),
            }
        }
    }

    struct PainterTool;

    #[async_trait]
    impl Tool for PainterTool {
        fn name(&self) -> &str {
            "painter"
        }

        fn description(&self) -> &str {
            "Paints a picture"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<AgentType, ToolError> {
            Ok(AgentType::image("painting.png"))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(WeatherTool).unwrap();
        registry.register(PainterTool).unwrap();
        Arc::new(registry)
    }

    #[test]
    fn parses_final_answer_with_answer_key() {
        let parsed = JsonActionParser
            .parse(r#"{"action": "final_answer", "action_input": {"answer": "image"}}"#)
            .unwrap();
        assert_eq!(parsed.rationale, "");
        assert_eq!(parsed.action, ParsedAction::FinalAnswer(json!("image")));
    }

    #[test]
    fn parses_final_answer_with_bare_input() {
        let parsed = JsonActionParser
            .parse(r#"Action: {"action": "final_answer", "action_input": 42}"#)
            .unwrap();
        assert_eq!(parsed.action, ParsedAction::FinalAnswer(json!(42)));
    }

    #[test]
    fn parses_tool_call_with_rationale() {
        let raw = "Thought: I need the weather.\nAction:\n{\n  \"action\": \"weather\",\n  \"action_input\": {\"city\": \"Paris\"}\n}<end_action>";
        let parsed = JsonActionParser.parse(raw).unwrap();
        assert_eq!(parsed.rationale, "Thought: I need the weather.");
        assert_eq!(
            parsed.action,
            ParsedAction::Call(ActionCall::new("weather", json!({"city": "Paris"})))
        );
    }

    #[test]
    fn reports_missing_json() {
        assert!(matches!(
            JsonActionParser.parse("I will just talk."),
            Err(ParseError::MissingJson(_))
        ));
        assert!(matches!(
            JsonActionParser.parse(""),
            Err(ParseError::MissingJson(_))
        ));
    }

    #[test]
    fn reports_invalid_json() {
        assert!(matches!(
            JsonActionParser.parse(r#"{"action": "weather", }"#),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn both_keys_are_required() {
        assert_eq!(
            JsonActionParser.parse(r#"{"action_input": {}}"#),
            Err(ParseError::MissingKey("action"))
        );
        assert_eq!(
            JsonActionParser.parse(r#"{"action": "weather"}"#),
            Err(ParseError::MissingKey("action_input"))
        );
        assert_eq!(
            JsonActionParser.parse(r#"{"action": "final_answer", "action_input": {"value": 1}}"#),
            Err(ParseError::MissingKey("answer"))
        );
    }

    #[tokio::test]
    async fn execute_returns_tool_output_as_observation() {
        let tools = registry();
        let mut state = RunState::new();
        let call = ActionCall::new("weather", json!({"city": "Paris"}));

        let outcome = JsonActionParser
            .execute(
                &call,
                ActionContext {
                    tools: &tools,
                    state: &mut state,
                    max_observation_len: 100,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Observation("sunny".to_string()));
    }

    #[tokio::test]
    async fn execute_stores_images_in_state() {
        let tools = registry();
        let mut state = RunState::new();
        let call = ActionCall::new("painter", json!({}));

        let outcome = JsonActionParser
            .execute(
                &call,
                ActionContext {
                    tools: &tools,
                    state: &mut state,
                    max_observation_len: 100,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Observation("Stored 'image.png' in memory.".to_string())
        );
        assert_eq!(
            state.get("image.png"),
            Some(&Value::Media(AgentType::image("painting.png")))
        );
    }

    #[tokio::test]
    async fn tool_failure_mentions_description() {
        let tools = registry();
        let mut state = RunState::new();
        let call = ActionCall::new("weather", json!({"city": "Atlantis"}));

        let error = JsonActionParser
            .execute(
                &call,
                ActionContext {
                    tools: &tools,
                    state: &mut state,
                    max_observation_len: 100,
                },
            )
            .await
            .unwrap_err();

        match error {
            AgentError::Execution(message) => {
                assert!(message.contains("no data for Atlantis"));
                assert!(message.contains("Gets the weather for a city"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_lists_alternatives() {
        let tools = registry();
        let mut state = RunState::new();
        let call = ActionCall::new("search", json!({}));

        let error = JsonActionParser
            .execute(
                &call,
                ActionContext {
                    tools: &tools,
                    state: &mut state,
                    max_observation_len: 100,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            AgentError::Execution(ref message)
                if message.contains("unknown tool 'search'") && message.contains("painter, weather")
        ));
    }
}
