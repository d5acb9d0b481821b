mod logging;

use std::sync::Arc;

use agent_core::{AgentType, ToolRegistry};
use agent_llm::{LLMEngine, OpenAIEngine};
use agent_loop::{
    stream_to_ui, Agent, AgentConfig, AgentState, StreamContent, StreamMessage, StreamOptions,
};
use anyhow::anyhow;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use futures::{pin_mut, StreamExt};

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Run a task through a JSON or code agent")]
#[command(version)]
struct Cli {
    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single task and stream its steps
    Run {
        task: String,

        #[arg(long, value_enum, default_value_t = Format::Code)]
        format: Format,

        #[arg(long, default_value_t = 6)]
        max_iterations: usize,

        /// Attach an image, available to the agent as `image`
        #[arg(long)]
        image: Option<String>,

        /// Extra text argument, repeatable
        #[arg(long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// Print the system prompt an agent would use
    Prompt {
        #[arg(long, value_enum, default_value_t = Format::Code)]
        format: Format,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Code,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn build_agent(engine: Arc<dyn LLMEngine>, format: Format) -> Agent {
    let tools = Arc::new(ToolRegistry::new());
    match format {
        Format::Json => Agent::json(engine, tools),
        Format::Code => Agent::code(engine, tools),
    }
}

fn print_message(message: &StreamMessage) {
    if let Some(metadata) = &message.metadata {
        println!("{}", format!("── {} ──", metadata.title).cyan());
    }

    match &message.content {
        StreamContent::Text(text) if text.starts_with("**Error:**") => println!("{}", text.red()),
        StreamContent::Text(text) if text.starts_with("**Final answer:**") => {
            println!("{}", text.green().bold())
        }
        StreamContent::Text(text) if text.starts_with("Step ") => println!("{}", text.dimmed()),
        StreamContent::Text(text) => println!("{}", text),
        StreamContent::File { path, mime_type } => println!(
            "{}",
            format!(
                "📎 {} ({})",
                path,
                mime_type.as_deref().unwrap_or("application/octet-stream")
            )
            .green()
            .bold()
        ),
    }
}

async fn run_task(
    cli: &Cli,
    task: &str,
    format: Format,
    max_iterations: usize,
    image: Option<String>,
    args: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let mut engine = OpenAIEngine::new(cli.model.clone()).with_base_url(cli.base_url.clone());
    if let Some(api_key) = &cli.api_key {
        engine = engine.with_api_key(api_key.clone());
    }

    let mut agent = build_agent(Arc::new(engine), format)
        .with_config(AgentConfig::default().with_max_iterations(max_iterations));

    let mut options = StreamOptions::default();
    if let Some(path) = image {
        options = options.with_arg("image", AgentType::image(path));
    }
    for (key, value) in args {
        options = options.with_arg(key, AgentType::text(value));
    }

    println!("{}", format!("🚀 Task: {}", task).cyan());
    log::debug!(
        "Using {} agent against {} ({})",
        agent.parser_name(),
        cli.base_url,
        cli.model
    );

    {
        let messages = stream_to_ui(&mut agent, task, options);
        pin_mut!(messages);
        while let Some(message) = messages.next().await {
            print_message(&message);
        }
    }

    let summary = agent.monitor().summary();
    println!(
        "{}",
        format!(
            "📊 Steps: {} | Input tokens: {} | Output tokens: {} | {:.2}s",
            summary.step_count,
            summary.total_tokens.input_tokens,
            summary.total_tokens.output_tokens,
            summary.total_duration_ms as f64 / 1000.0
        )
        .dimmed()
    );

    match agent.state() {
        AgentState::Failed(error) => Err(anyhow!("run {} failed: {}", agent.run_id(), error)),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    match &cli.command {
        Commands::Run {
            task,
            format,
            max_iterations,
            image,
            args,
        } => {
            run_task(
                &cli,
                task,
                *format,
                *max_iterations,
                image.clone(),
                args.clone(),
            )
            .await
        }
        Commands::Prompt { format } => {
            let engine = OpenAIEngine::new(cli.model.clone());
            println!("{}", build_agent(Arc::new(engine), *format).system_prompt());
            Ok(())
        }
    }
}
