use agent_core::{ToolSchema, FINAL_ANSWER_TOOL};

pub const TOOL_DESCRIPTIONS_PLACEHOLDER: &str = "{{tool_descriptions}}";

const FINAL_ANSWER_DESCRIPTION: &str = "Provides a final answer to the given problem.";

pub const JSON_SYSTEM_PROMPT: &str = r#"You are an expert assistant who can solve any task using JSON tool calls. You will be given a task to solve as best you can.
To do so, you have been given access to the following tools:
{{tool_descriptions}}

Answer in the following format, and nothing else:

Thought: your reasoning about what to do next
Action:
{
  "action": "<tool name>",
  "action_input": <tool arguments as a JSON object>
}<end_action>

The action is executed and you receive its result as an "Observation:" message. You can call one tool per step.
To finish, call the "final_answer" tool:
Action:
{
  "action": "final_answer",
  "action_input": {"answer": "<your answer>"}
}<end_action>

Rules:
1. ALWAYS provide a 'Thought:' sequence and an 'Action:' sequence ending with '<end_action>'.
2. Both "action" and "action_input" are required.
3. To return a value stored in memory (for example an image), pass its name as the answer.
"#;

pub const CODE_SYSTEM_PROMPT: &str = r#"You are an expert assistant who can solve any task using code blobs. You will be given a task to solve as best you can.
To do so, you have been given access to the following tools, callable as Python functions:
{{tool_descriptions}}

Answer in the following format, and nothing else:

Thought: your reasoning about what to do next
Code:
```py
# flat Python statements only
result = some_tool(argument)
print(result)
```<end_action>

Whatever you print is returned to you as an "Observation:" message on the next step. Variables persist between steps.
To finish, call final_answer:
Code:
```py
final_answer(result)
```<end_action>

Rules:
1. ALWAYS provide a 'Thought:' sequence and a 'Code:' sequence ending with '```<end_action>'.
2. Only assignments, expressions and function calls are available: no if, for, def, import or class.
3. Never name a variable after a tool or after final_answer.
"#;

pub const MAX_ITERATIONS_PROMPT: &str = "You did not reach a final answer within the allowed number of steps. Based on the task and the steps above, give your best final answer now, as plain text.";

/// One bullet per tool, `final_answer` last.
pub fn describe_tools(tools: &[ToolSchema]) -> String {
    let mut lines: Vec<String> = tools
        .iter()
        .map(|tool| {
            let function = &tool.function;
            format!(
                "- {}: {}\n    Takes inputs: {{{}}}",
                function.name,
                function.description,
                function.describe_inputs()
            )
        })
        .collect();

    lines.push(format!(
        "- {}: {}\n    Takes inputs: {{answer: any}}",
        FINAL_ANSWER_TOOL, FINAL_ANSWER_DESCRIPTION
    ));

    lines.join("\n")
}

pub fn render_system_prompt(template: &str, tools: &[ToolSchema]) -> String {
    template.replace(TOOL_DESCRIPTIONS_PLACEHOLDER, &describe_tools(tools))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::FunctionSchema;
    use serde_json::json;

    fn search_schema() -> ToolSchema {
        ToolSchema {
            schema_type: "function".to_string(),
            function: FunctionSchema {
                name: "search".to_string(),
                description: "Searches the web".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
            },
        }
    }

    #[test]
    fn final_answer_is_always_advertised() {
        let description = describe_tools(&[]);
        assert!(description.starts_with("- final_answer:"));
    }

    #[test]
    fn tools_are_listed_before_final_answer() {
        let description = describe_tools(&[search_schema()]);
        let search = description.find("- search: Searches the web").unwrap();
        let final_answer = description.find("- final_answer").unwrap();
        assert!(search < final_answer);
        assert!(description.contains("Takes inputs: {query: string}"));
    }

    #[test]
    fn render_replaces_placeholder() {
        for template in [JSON_SYSTEM_PROMPT, CODE_SYSTEM_PROMPT] {
            let rendered = render_system_prompt(template, &[search_schema()]);
            assert!(!rendered.contains(TOOL_DESCRIPTIONS_PLACEHOLDER));
            assert!(rendered.contains("- search:"));
        }
    }
}
