pub mod executor;
pub mod registry;
pub mod types;

pub use executor::{bind_arguments, execute_action, ToolError};
pub use registry::{is_valid_tool_name, RegistryError, SharedTool, Tool, ToolRegistry};
pub use types::{FunctionSchema, ToolSchema};

/// Name under which both action formats report the terminal answer.
pub const FINAL_ANSWER_TOOL: &str = "final_answer";
