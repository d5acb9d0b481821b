mod common;

use std::sync::Arc;

use agent_core::{AgentError, AgentEvent, AgentType, Role, RunArgs, Tool, ToolError, ToolRegistry};
use agent_loop::{
    stream_to_ui, Agent, AgentConfig, AgentState, MaxIterationsPolicy, StreamOptions,
    DEFAULT_MAX_ITERATIONS_ANSWER,
};
use async_trait::async_trait;
use common::FakeEngine;
use futures::StreamExt;
use serde_json::json;

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
        let city = args["city"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("city is required".to_string()))?;
        Ok(AgentType::text(format!("sunny in {city}")))
    }
}

fn tools() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.register(WeatherTool).unwrap();
    Arc::new(registry)
}

fn ok(output: &str) -> Result<String, String> {
    Ok(output.to_string())
}

#[tokio::test]
async fn json_agent_calls_tool_then_answers() {
    let engine = Arc::new(FakeEngine::new(vec![
        ok("Thought: check\nAction:\n{\"action\": \"weather\", \"action_input\": {\"city\": \"Paris\"}}<end_action>"),
        ok("Action:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"It is sunny.\"}}"),
    ]));
    let mut agent = Agent::json(engine.clone(), tools());

    let answer = agent.run("What is the weather?", RunArgs::new()).await.unwrap();

    assert_eq!(answer, AgentType::text("It is sunny."));
    assert_eq!(engine.calls(), 2);
    assert_eq!(agent.logs().len(), 2);
    assert_eq!(agent.logs()[0].observation.as_deref(), Some("sunny in Paris"));
    assert_eq!(agent.logs()[0].rationale.as_deref(), Some("Thought: check"));
    assert_eq!(agent.monitor().total_input_token_count(), 20);
    assert_eq!(agent.monitor().total_output_token_count(), 40);

    let second_prompt = engine.prompt(1);
    assert_eq!(second_prompt[0].role, Role::System);
    assert!(second_prompt[0].content.contains("- weather: Gets the weather for a city"));
    assert_eq!(second_prompt[1].content, "Task: What is the weather?");
    assert_eq!(second_prompt[2].role, Role::Assistant);
    assert_eq!(
        second_prompt[3].content,
        "[OUTPUT OF STEP 0] -> Observation:\nsunny in Paris"
    );
}

#[tokio::test]
async fn code_agent_keeps_variables_between_steps() {
    let engine = Arc::new(FakeEngine::new(vec![
        ok("Code:\n```py\nreport = weather('Oslo')\nprint(report)\n```"),
        ok("Code:\n```py\nfinal_answer(report.upper())\n```"),
    ]));
    let mut agent = Agent::code(engine.clone(), tools());

    let answer = agent.run("Weather in Oslo?", RunArgs::new()).await.unwrap();

    assert_eq!(answer, AgentType::text("SUNNY IN OSLO"));
    assert_eq!(
        agent.logs()[0].observation.as_deref(),
        Some("Print outputs:\nsunny in Oslo\n")
    );
}

#[tokio::test]
async fn run_args_are_announced_and_visible_to_code() {
    let engine = Arc::new(FakeEngine::replying("Code:\n```py\nfinal_answer(image)\n```"));
    let mut agent = Agent::code(engine.clone(), tools());

    let mut args = RunArgs::new();
    args.insert("image".to_string(), AgentType::image("cat.png"));
    let answer = agent.run("Describe", args).await.unwrap();

    assert_eq!(answer, AgentType::image("cat.png"));
    assert_eq!(
        engine.prompt(0)[1].content,
        "Task: Describe\nYou have been provided with these initial arguments: {\"image\":\"cat.png\"}."
    );
}

#[tokio::test]
async fn max_iterations_returns_sentinel() {
    let engine = Arc::new(FakeEngine::replying(
        "{\"action\": \"weather\", \"action_input\": {\"city\": \"Rome\"}}",
    ));
    let mut agent = Agent::json(engine.clone(), tools())
        .with_config(AgentConfig::default().with_max_iterations(3));

    let answer = agent.run("Loop forever", RunArgs::new()).await.unwrap();

    assert_eq!(answer, AgentType::text(DEFAULT_MAX_ITERATIONS_ANSWER));
    assert_eq!(engine.calls(), 3);
    assert_eq!(agent.monitor().steps().len(), 3);
    assert_eq!(
        agent.state(),
        &AgentState::Done(AgentType::text(DEFAULT_MAX_ITERATIONS_ANSWER))
    );
}

#[tokio::test]
async fn max_iterations_can_ask_engine() {
    let engine = Arc::new(FakeEngine::new(vec![
        ok("{\"action\": \"weather\", \"action_input\": {\"city\": \"Rome\"}}"),
        ok("  Probably sunny.  "),
    ]));
    let config = AgentConfig::default()
        .with_max_iterations(1)
        .with_max_iterations_policy(MaxIterationsPolicy::AskEngine);
    let mut agent = Agent::json(engine.clone(), tools()).with_config(config);

    let answer = agent.run("Weather?", RunArgs::new()).await.unwrap();

    assert_eq!(answer, AgentType::text("Probably sunny."));
    assert_eq!(engine.calls(), 2);
    assert_eq!(agent.monitor().total_input_token_count(), 20);
}

#[tokio::test]
async fn max_iterations_ask_engine_failure_fails_the_run() {
    let engine = Arc::new(FakeEngine::new(vec![
        ok("{\"action\": \"weather\", \"action_input\": {\"city\": \"Rome\"}}"),
        Err("down".to_string()),
    ]));
    let config = AgentConfig::default()
        .with_max_iterations(1)
        .with_max_iterations_policy(MaxIterationsPolicy::AskEngine);
    let mut agent = Agent::json(engine.clone(), tools()).with_config(config);

    let error = agent.run("Weather?", RunArgs::new()).await.unwrap_err();

    assert!(matches!(error, AgentError::Generation(ref message) if message.contains("down")));
    assert!(matches!(agent.state(), AgentState::Failed(AgentError::Generation(_))));
    assert_eq!(engine.calls(), 2);
    assert_eq!(agent.monitor().steps().len(), 2);
    assert_eq!(agent.monitor().total_input_token_count(), 20);
    assert_eq!(agent.monitor().total_output_token_count(), 40);
}

#[tokio::test]
async fn runaway_code_fails_the_run_instead_of_crashing() {
    let nested = format!("Code:\n```py\nx = {}1{}\n```", "(".repeat(1000), ")".repeat(1000));
    let precision = "Code:\n```py\nfinal_answer(f\"{1:.70000f}\")\n```";

    for output in [nested.as_str(), precision] {
        let engine = Arc::new(FakeEngine::replying(output));
        let mut agent = Agent::code(engine, tools())
            .with_config(AgentConfig::default().with_max_iterations(1));

        let error = agent.run("Task", RunArgs::new()).await.unwrap_err();

        assert!(matches!(error, AgentError::Execution(_)), "{error:?}");
        assert!(matches!(agent.state(), AgentState::Failed(_)));
        assert_eq!(agent.monitor().steps().len(), 1);
    }
}

#[tokio::test]
async fn stream_run_yields_events_in_order() {
    let engine = Arc::new(FakeEngine::replying(
        "{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"done\"}}",
    ));
    let mut agent = Agent::json(engine, tools());

    let events: Vec<_> = agent.stream_run("Task", RunArgs::new()).collect().await;
    let kinds: Vec<&str> = events
        .iter()
        .map(|event| match event {
            Ok(AgentEvent::StepStarted { .. }) => "started",
            Ok(AgentEvent::ModelOutput { .. }) => "output",
            Ok(AgentEvent::ToolCall { .. }) => "call",
            Ok(AgentEvent::Observation { .. }) => "observation",
            Ok(AgentEvent::StepFinished { .. }) => "finished",
            Ok(AgentEvent::MaxIterationsReached { .. }) => "max",
            Ok(AgentEvent::FinalAnswer { .. }) => "answer",
            Err(_) => "error",
        })
        .collect();

    assert_eq!(kinds, vec!["started", "output", "call", "finished", "answer"]);
}

#[tokio::test]
async fn parse_failure_ends_the_run_without_retry() {
    let engine = Arc::new(FakeEngine::new(vec![ok("no json here"), ok("never used")]));
    let mut agent = Agent::json(engine.clone(), tools());

    let error = agent.run("Task", RunArgs::new()).await.unwrap_err();

    assert!(matches!(error, AgentError::Parsing(_)));
    assert_eq!(engine.calls(), 1);
    assert!(agent.logs()[0].error.is_some());
}

#[tokio::test]
async fn monitor_accumulates_across_runs_unless_configured() {
    let answer = "{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"ok\"}}";

    let mut agent = Agent::json(Arc::new(FakeEngine::replying(answer)), tools());
    agent.run("one", RunArgs::new()).await.unwrap();
    agent.run("two", RunArgs::new()).await.unwrap();
    assert_eq!(agent.monitor().total_input_token_count(), 20);
    assert_eq!(agent.logs().len(), 1);

    let mut agent = Agent::json(Arc::new(FakeEngine::replying(answer)), tools())
        .with_config(AgentConfig::default().with_reset_monitor_each_run(true));
    agent.run("one", RunArgs::new()).await.unwrap();
    agent.run("two", RunArgs::new()).await.unwrap();
    assert_eq!(agent.monitor().total_input_token_count(), 10);
    assert_eq!(agent.monitor().total_output_token_count(), 20);
}

#[tokio::test]
async fn relay_without_test_mode_adds_titles_and_footers() {
    let engine = Arc::new(FakeEngine::new(vec![
        ok("{\"action\": \"weather\", \"action_input\": {\"city\": \"Lima\"}}"),
        ok("{\"action\": \"final_answer\", \"action_input\": \"warm\"}"),
    ]));
    let mut agent = Agent::json(engine, tools());

    let messages: Vec<_> = stream_to_ui(&mut agent, "Task", StreamOptions::default())
        .collect()
        .await;

    let titles: Vec<&str> = messages
        .iter()
        .filter_map(|m| m.metadata.as_ref().map(|meta| meta.title.as_str()))
        .collect();
    assert!(titles.contains(&"Used tool weather"));
    assert!(titles.contains(&"Observation"));
    assert!(messages
        .iter()
        .any(|m| m.content.as_text().is_some_and(|t| t.starts_with("Step 0 |"))));
    assert_eq!(
        messages.last().unwrap().content.as_text(),
        Some("**Final answer:** warm")
    );
}

#[tokio::test]
async fn relay_announces_max_iterations_before_answer() {
    let engine = Arc::new(FakeEngine::replying(
        "{\"action\": \"weather\", \"action_input\": {\"city\": \"Rome\"}}",
    ));
    let mut agent =
        Agent::json(engine, tools()).with_config(AgentConfig::default().with_max_iterations(1));

    let messages: Vec<_> = stream_to_ui(&mut agent, "Task", StreamOptions::test())
        .collect()
        .await;

    let texts: Vec<&str> = messages.iter().filter_map(|m| m.content.as_text()).collect();
    let notice = texts.len() - 2;
    assert!(texts[notice].contains("without a final answer"));
    assert_eq!(
        texts[notice + 1],
        format!("**Final answer:** {DEFAULT_MAX_ITERATIONS_ANSWER}")
    );
}
