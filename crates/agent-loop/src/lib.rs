pub mod config;
pub mod parser;
pub mod prompts;
pub mod runner;
pub mod step;
pub mod stream;

pub use config::{AgentConfig, MaxIterationsPolicy, DEFAULT_MAX_ITERATIONS_ANSWER};
pub use parser::{
    ActionContext, CodeActionParser, JsonActionParser, ParseError, ParsedAction, ParsedResponse,
    ResponseParser, RunState, StepOutcome, PYTHON_INTERPRETER_TOOL,
};
pub use runner::{Agent, AgentState};
pub use step::StepLog;
pub use stream::{stream_to_ui, StreamContent, StreamMessage, StreamOptions};
