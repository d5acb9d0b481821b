use serde_json::{Map, Value};
use thiserror::Error;

use crate::agent::{ActionCall, AgentType};
use crate::tools::{FunctionSchema, ToolRegistry};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Runs a parsed action against the registry.
pub async fn execute_action(call: &ActionCall, registry: &ToolRegistry) -> Result<AgentType> {
    let tool = registry.get(&call.name).ok_or_else(|| {
        ToolError::NotFound(format!(
            "unknown tool '{}', should be one of: {}",
            call.name,
            registry.names().join(", ")
        ))
    })?;

    let args = bind_arguments(&tool.to_schema().function, call.input.clone())?;
    log::debug!("executing tool '{}' with {}", call.name, args);

    tool.execute(args).await
}

/// Normalizes an action input into the argument object a tool expects.
///
/// Objects pass through untouched; `null` becomes `{}`; any other scalar binds
/// to the tool's single required parameter.
pub fn bind_arguments(schema: &FunctionSchema, input: Value) -> Result<Value> {
    match input {
        Value::Object(_) => Ok(input),
        Value::Null => Ok(Value::Object(Map::new())),
        other => {
            let required = schema.required_params();
            match required.as_slice() {
                [single] => {
                    let mut args = Map::new();
                    args.insert(single.clone(), other);
                    Ok(Value::Object(args))
                }
                _ => Err(ToolError::InvalidArguments(format!(
                    "tool '{}' expects named arguments, got {}",
                    schema.name, other
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::tools::Tool;

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its input"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, args: Value) -> Result<AgentType> {
            args["text"]
                .as_str()
                .map(AgentType::text)
                .ok_or_else(|| ToolError::InvalidArguments("text is required".to_string()))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(EchoTool).expect("register echo");
        registry
    }

    #[tokio::test]
    async fn execute_action_runs_registered_tool() {
        let call = ActionCall::new("echo", json!({"text": "hi"}));
        let output = execute_action(&call, &registry()).await.unwrap();
        assert_eq!(output, AgentType::text("hi"));
    }

    #[tokio::test]
    async fn execute_action_binds_scalar_input() {
        let call = ActionCall::new("echo", json!("scalar"));
        let output = execute_action(&call, &registry()).await.unwrap();
        assert_eq!(output, AgentType::text("scalar"));
    }

    #[tokio::test]
    async fn execute_action_reports_unknown_tool_with_alternatives() {
        let call = ActionCall::new("search", json!({}));
        let error = execute_action(&call, &registry()).await.unwrap_err();
        assert!(
            matches!(error, ToolError::NotFound(ref message) if message.contains("search") && message.contains("echo"))
        );
    }

    #[test]
    fn bind_arguments_rejects_scalar_for_multi_param_tool() {
        let schema = FunctionSchema {
            name: "pair".to_string(),
            description: String::new(),
            parameters: json!({"type": "object", "required": ["a", "b"]}),
        };
        assert!(matches!(
            bind_arguments(&schema, json!(3)),
            Err(ToolError::InvalidArguments(_))
        ));
        assert_eq!(bind_arguments(&schema, Value::Null).unwrap(), json!({}));
    }
}
