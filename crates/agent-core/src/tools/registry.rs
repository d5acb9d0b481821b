use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

use crate::agent::AgentType;
use crate::sandbox::BUILTINS;
use crate::tools::{FunctionSchema, ToolError, ToolSchema, FINAL_ANSWER_TOOL};

/// A capability the agent can call during a run.
///
/// JSON agents call it with the `action_input` object; code agents call it as
/// a Python function, so the name has to be a valid identifier.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the input object. `required` fixes positional order.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value) -> Result<AgentType, ToolError>;

    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            schema_type: "function".to_string(),
            function: FunctionSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }
}

pub type SharedTool = Arc<dyn Tool>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),

    #[error("'{0}' is not a valid tool name, use letters, digits and underscores")]
    InvalidName(String),

    #[error("'{0}' is reserved by the agent")]
    Reserved(String),
}

/// Tools available to one or more agents, keyed by exact name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, SharedTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&self, tool: T) -> Result<(), RegistryError>
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    pub fn register_shared(&self, tool: SharedTool) -> Result<(), RegistryError> {
        let name = tool.name();
        if !is_valid_tool_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if name == FINAL_ANSWER_TOOL || BUILTINS.contains(&name) {
            return Err(RegistryError::Reserved(name.to_string()));
        }

        match self.tools.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(name.to_string())),
            Entry::Vacant(entry) => {
                log::debug!("registered tool '{}'", name);
                entry.insert(tool);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<SharedTool> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Schemas sorted by name, so prompts render the same way every run.
    pub fn list_tools(&self) -> Vec<ToolSchema> {
        let mut tools: Vec<ToolSchema> = self
            .tools
            .iter()
            .map(|entry| entry.value().to_schema())
            .collect();
        tools.sort_by(|left, right| left.function.name.cmp(&right.function.name));
        tools
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Python identifier rules, ASCII only.
pub fn is_valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<AgentType, ToolError> {
            Ok(AgentType::text("ok"))
        }
    }

    #[test]
    fn lookup_is_exact() {
        let registry = ToolRegistry::new();
        registry.register(NamedTool("web_search")).unwrap();

        assert!(registry.contains("web_search"));
        assert!(registry.get("web_search").is_some());
        assert!(registry.get("Web_Search").is_none());
        assert!(registry.get(" web_search").is_none());
    }

    #[test]
    fn duplicates_are_rejected() {
        let registry = ToolRegistry::new();
        registry.register(NamedTool("translate")).unwrap();

        assert_eq!(
            registry.register(NamedTool("translate")),
            Err(RegistryError::Duplicate("translate".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_must_be_callable_from_code() {
        let registry = ToolRegistry::new();
        for name in ["", "2fast", "web-search", "a b", "default::search"] {
            assert_eq!(
                registry.register(NamedTool(name)),
                Err(RegistryError::InvalidName(name.to_string()))
            );
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn final_answer_and_builtins_are_reserved() {
        let registry = ToolRegistry::new();
        for name in ["final_answer", "print", "len"] {
            assert_eq!(
                registry.register(NamedTool(name)),
                Err(RegistryError::Reserved(name.to_string()))
            );
        }
    }

    #[test]
    fn listings_are_sorted() {
        let registry = ToolRegistry::new();
        registry.register(NamedTool("zoom")).unwrap();
        registry.register(NamedTool("_private")).unwrap();
        registry.register(NamedTool("alpha2")).unwrap();

        assert_eq!(registry.names(), vec!["_private", "alpha2", "zoom"]);
        let schemas = registry.list_tools();
        assert_eq!(schemas[2].function.name, "zoom");
        assert_eq!(schemas[0].schema_type, "function");
    }
}
