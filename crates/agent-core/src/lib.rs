pub mod agent;
pub mod sandbox;
pub mod tools;

pub use agent::events::{AgentEvent, TokenUsage};
pub use agent::types::{ActionCall, AgentType, Message, Role, RunArgs, TokenCounter};
pub use agent::AgentError;
pub use sandbox::{Evaluation, InterpreterError, Outcome, Sandbox, Value};
pub use tools::{
    bind_arguments, execute_action, FunctionSchema, RegistryError, SharedTool, Tool, ToolError,
    ToolRegistry, ToolSchema, FINAL_ANSWER_TOOL,
};
