use async_stream::stream;
use futures::{pin_mut, Stream, StreamExt};

use agent_core::{ActionCall, AgentEvent, AgentType, RunArgs, TokenUsage};

use super::message::StreamMessage;
use crate::parser::PYTHON_INTERPRETER_TOOL;
use crate::runner::Agent;

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Drop metadata titles and per-step footers, leaving only content.
    pub test_mode: bool,
    /// Extra named arguments for the run
    pub args: RunArgs,
}

impl StreamOptions {
    pub fn test() -> Self {
        Self {
            test_mode: true,
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: AgentType) -> Self {
        self.args.insert(name.into(), value);
        self
    }
}

/// Runs `task` on `agent` and relays each step as display-ready messages.
///
/// Every call drives one fresh run. When the run fails the last message is
/// `**Error:** ...` and nothing follows it.
pub fn stream_to_ui<'a>(
    agent: &'a mut Agent,
    task: &str,
    options: StreamOptions,
) -> impl Stream<Item = StreamMessage> + 'a {
    let test_mode = options.test_mode;
    let events = agent.stream_run(task, options.args);

    stream! {
        pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    for message in messages_for_event(event, test_mode) {
                        yield message;
                    }
                }
                Err(error) => {
                    yield StreamMessage::text(format!("**Error:** {}", error));
                    return;
                }
            }
        }
    }
}

fn format_call(call: &ActionCall) -> String {
    if call.name == PYTHON_INTERPRETER_TOOL {
        let code = call.input["code"].as_str().unwrap_or_default();
        return format!("```py\n{}\n```", code);
    }
    format!("{}({})", call.name, call.input)
}

fn format_footer(iteration: usize, duration_ms: u64, usage: &TokenUsage) -> String {
    format!(
        "Step {} | {:.2}s | input {} | output {}",
        iteration,
        duration_ms as f64 / 1000.0,
        usage.input_tokens,
        usage.output_tokens
    )
}

fn final_answer_message(answer: &AgentType) -> StreamMessage {
    match StreamMessage::file(answer) {
        Some(message) => message,
        None => StreamMessage::text(format!("**Final answer:** {}", answer)),
    }
}

fn messages_for_event(event: AgentEvent, test_mode: bool) -> Vec<StreamMessage> {
    let titled = |message: StreamMessage, title: String| {
        if test_mode {
            message
        } else {
            message.with_title(title)
        }
    };

    match event {
        AgentEvent::StepStarted { .. } => Vec::new(),
        AgentEvent::ModelOutput { content, .. } => {
            let content = content.replace("<end_action>", "");
            let content = content.trim();
            if content.is_empty() {
                Vec::new()
            } else {
                vec![StreamMessage::text(content)]
            }
        }
        AgentEvent::ToolCall { call, .. } => vec![titled(
            StreamMessage::text(format_call(&call)),
            format!("Used tool {}", call.name),
        )],
        AgentEvent::Observation { content, .. } => vec![titled(
            StreamMessage::text(format!("```\n{}\n```", content.trim())),
            "Observation".to_string(),
        )],
        AgentEvent::StepFinished {
            iteration,
            duration_ms,
            usage,
        } => {
            if test_mode {
                Vec::new()
            } else {
                vec![StreamMessage::text(format_footer(iteration, duration_ms, &usage))]
            }
        }
        AgentEvent::MaxIterationsReached { max_iterations } => vec![StreamMessage::text(format!(
            "Reached the limit of {} steps without a final answer.",
            max_iterations
        ))],
        AgentEvent::FinalAnswer { answer } => vec![final_answer_message(&answer)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn code_calls_are_fenced() {
        let call = ActionCall::new(PYTHON_INTERPRETER_TOOL, json!({"code": "print(1)"}));
        assert_eq!(format_call(&call), "```py\nprint(1)\n```");
    }

    #[test]
    fn json_calls_render_as_function_calls() {
        let call = ActionCall::new("search", json!({"query": "rust"}));
        assert_eq!(format_call(&call), r#"search({"query":"rust"})"#);
    }

    #[test]
    fn final_answers_by_kind() {
        let text = final_answer_message(&AgentType::text("Answer."));
        assert_eq!(text.content.as_text(), Some("**Final answer:** Answer."));

        let image = final_answer_message(&AgentType::image("path.png"));
        assert_eq!(image.content.path(), Some("path.png"));

        let json = final_answer_message(&AgentType::Json { value: json!([1, 2]) });
        assert_eq!(json.content.as_text(), Some("**Final answer:** [1,2]"));
    }

    #[test]
    fn test_mode_drops_titles_and_footers() {
        let call = AgentEvent::ToolCall {
            iteration: 0,
            call: ActionCall::new("search", json!({})),
        };
        let finished = AgentEvent::StepFinished {
            iteration: 0,
            duration_ms: 1_500,
            usage: TokenUsage::new(10, 20),
        };

        let relayed = messages_for_event(call.clone(), true);
        assert!(relayed[0].metadata.is_none());
        assert!(messages_for_event(finished.clone(), true).is_empty());

        let relayed = messages_for_event(call, false);
        assert_eq!(
            relayed[0].metadata.as_ref().map(|m| m.title.as_str()),
            Some("Used tool search")
        );
        let footer = messages_for_event(finished, false);
        assert_eq!(
            footer[0].content.as_text(),
            Some("Step 0 | 1.50s | input 10 | output 20")
        );
    }

    #[test]
    fn model_output_drops_end_marker() {
        let messages = messages_for_event(
            AgentEvent::ModelOutput {
                iteration: 0,
                content: "Thought: done\n<end_action>".to_string(),
            },
            true,
        );
        assert_eq!(messages[0].content.as_text(), Some("Thought: done"));
    }
}
