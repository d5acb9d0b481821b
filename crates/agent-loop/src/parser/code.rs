use std::sync::OnceLock;

use agent_core::{ActionCall, AgentError, Outcome, Sandbox, Value};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::{
    split_rationale, truncate_observation, ActionContext, ParseError, ParsedAction,
    ParsedResponse, ResponseParser, StepOutcome,
};
use crate::prompts::CODE_SYSTEM_PROMPT;

/// Name under which code actions are reported.
pub const PYTHON_INTERPRETER_TOOL: &str = "python_interpreter";

const CODE_MARKER: &str = "Code:";

static CODE_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

fn code_block_regex() -> Option<&'static Regex> {
    CODE_BLOCK
        .get_or_init(|| Regex::new(r"```(?:py|python)?[ \t]*\r?\n((?s).*?)```").ok())
        .as_ref()
}

/// Actions written as a fenced Python block, run in the sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeActionParser;

impl CodeActionParser {
    pub fn new() -> Self {
        Self
    }
}

fn extract_code(text: &str) -> Result<String, ParseError> {
    let regex = code_block_regex().ok_or(ParseError::MissingCode)?;
    regex
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str().trim_end().to_string())
        .filter(|code| !code.trim().is_empty())
        .ok_or(ParseError::MissingCode)
}

fn format_observation(print_outputs: &str, last: &Value) -> String {
    let mut observation = format!("Print outputs:\n{print_outputs}");
    if *last != Value::None {
        observation.push_str(&format!("\nLast output from code snippet:\n{last}"));
    }
    observation
}

#[async_trait]
impl ResponseParser for CodeActionParser {
    fn name(&self) -> &'static str {
        "code"
    }

    fn default_system_prompt(&self) -> &'static str {
        CODE_SYSTEM_PROMPT
    }

    fn parse(&self, raw: &str) -> Result<ParsedResponse, ParseError> {
        let (rationale, code_text) = split_rationale(raw, CODE_MARKER);
        let code = extract_code(code_text)?;

        Ok(ParsedResponse {
            rationale: rationale.to_string(),
            action: ParsedAction::Call(ActionCall::new(
                PYTHON_INTERPRETER_TOOL,
                json!({ "code": code }),
            )),
        })
    }

    async fn execute(
        &self,
        call: &ActionCall,
        ctx: ActionContext<'_>,
    ) -> Result<StepOutcome, AgentError> {
        let code = call.input["code"].as_str().ok_or_else(|| {
            AgentError::Execution(format!("'{}' expects a code string", call.name))
        })?;

        let evaluation = Sandbox::new(ctx.tools, ctx.state).evaluate(code).await?;

        match evaluation.outcome {
            Outcome::FinalAnswer(answer) => Ok(StepOutcome::FinalAnswer(answer.into_agent())),
            Outcome::Completed(last) => Ok(StepOutcome::Observation(truncate_observation(
                &format_observation(&evaluation.print_outputs, &last),
                ctx.max_observation_len,
            ))),
        }
    }
}
