//! Vigil CLI: a tool-using assistant for analyzing captured HTTP traffic.

mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use vigil_api::{OpenAiProvider, RetryPolicy};
use vigil_config::{CliOverrides, VigilConfig};
use vigil_core::{Agent, AgentEvent, Analyzer, Outcome};
use vigil_mcp::{McpManager, ServerStatus, StatusMap};
use vigil_tools::{Blacklist, ReqwestSender, ToolDispatcher};
use vigil_types::{Provenance, Usage, preview};

use crate::prompt::TerminalInput;

#[derive(Parser)]
#[command(name = "vigil", version, about = "A tool-using assistant for HTTP traffic analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model to use
    #[arg(long, global = true)]
    model: Option<String>,

    /// Maximum tokens per chat request
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// API key (overrides VIGIL_API_KEY / OPENAI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Directory holding tools.json and tool scripts
    #[arg(long, global = true)]
    tools_dir: Option<PathBuf>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question; the model may call tools to answer it
    Ask {
        /// The question or task
        prompt: String,
    },
    /// Analyze a captured HTTP request/response pair
    Analyze {
        /// File holding the raw request
        #[arg(long)]
        request: PathBuf,
        /// File holding the raw response
        #[arg(long)]
        response: Option<PathBuf>,
    },
    /// List every tool the model can call
    Tools,
    /// Connect to the configured MCP servers and show their status
    Mcp,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = VigilConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        max_tokens: cli.max_tokens,
        tools_dir: cli.tools_dir,
    })
    .context("Failed to load configuration")?;
    tracing::debug!(model = %config.model, base_url = %config.api_base_url, "Configuration loaded");

    let mcp = Arc::new(McpManager::new());
    let status_log = tokio::spawn(log_status_changes(mcp.subscribe_status()));
    mcp.reload(&config.mcp).await;

    let input = TerminalInput::new();
    let dispatcher = Arc::new(build_dispatcher(&config, &mcp, &input)?);

    let result = match cli.command {
        Command::Ask { prompt } => ask(&config, dispatcher, &input, &prompt).await,
        Command::Analyze { request, response } => {
            analyze(&config, dispatcher, &input, &request, response.as_deref()).await
        }
        Command::Tools => list_tools(&dispatcher).await,
        Command::Mcp => show_mcp(&config, &mcp).await,
    };

    mcp.shutdown().await;
    status_log.abort();
    result
}

/// Log each MCP server status transition as it happens.
async fn log_status_changes(mut rx: watch::Receiver<StatusMap>) {
    let mut last = StatusMap::new();
    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();
        for (server, status) in &current {
            if last.get(server) == Some(status) {
                continue;
            }
            match status {
                ServerStatus::Failed(_) => tracing::warn!(server = %server, "MCP server {status}"),
                _ => tracing::info!(server = %server, "MCP server {status}"),
            }
        }
        last = current;
    }
}

fn build_dispatcher(
    config: &VigilConfig,
    mcp: &Arc<McpManager>,
    input: &TerminalInput,
) -> Result<ToolDispatcher> {
    let sender = ReqwestSender::new().context("Failed to create HTTP client")?;
    let mut dispatcher = ToolDispatcher::new()
        .with_builtins(Arc::new(sender), config.builtin_run_cmd)
        .with_remote(mcp.clone())
        .with_blacklist(Blacklist::from_csv(&config.blacklist))
        .with_confirm_handler(input.confirm_handler());
    if let Some(dir) = &config.tools_dir {
        dispatcher = dispatcher.with_tools_dir(dir.clone());
    }
    Ok(dispatcher)
}

/// Build an agent wired to the terminal: events to stderr, stdin lines as
/// interventions, Ctrl+C as cancellation.
fn start_agent(
    config: &VigilConfig,
    dispatcher: Arc<ToolDispatcher>,
    input: &TerminalInput,
) -> Result<(Agent, JoinHandle<()>)> {
    let provider = OpenAiProvider::new(config.require_api_key()?, &config.api_base_url)
        .context("Failed to create API client")?
        .with_retry(RetryPolicy {
            retries: config.api_retries,
            ..RetryPolicy::default()
        });

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move { print_events(rx).await });
    let agent = Agent::new(Arc::new(provider), dispatcher, config.model.clone()).with_events(tx);

    let handle = agent.handle();
    input.forward_to(handle.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  [cancelling]");
            handle.cancel();
        }
    });

    eprintln!(
        "vigil v{} (model: {}). Type a line and press Enter to steer the analysis; Ctrl+C to stop.",
        env!("CARGO_PKG_VERSION"),
        config.model
    );
    Ok((agent, printer))
}

async fn ask(
    config: &VigilConfig,
    dispatcher: Arc<ToolDispatcher>,
    input: &TerminalInput,
    prompt: &str,
) -> Result<()> {
    let (agent, printer) = start_agent(config, dispatcher, input)?;
    let outcome = agent
        .run(config.system_prompt.as_deref(), prompt, config.max_tokens)
        .await;
    // Dropping the agent closes the event channel so the printer drains.
    drop(agent);
    let _ = printer.await;
    finish(outcome)
}

async fn analyze(
    config: &VigilConfig,
    dispatcher: Arc<ToolDispatcher>,
    input: &TerminalInput,
    request_path: &Path,
    response_path: Option<&Path>,
) -> Result<()> {
    let request = read_capture(request_path)?;
    let response = match response_path {
        Some(path) => read_capture(path)?,
        None => String::new(),
    };

    let (agent, printer) = start_agent(config, dispatcher, input)?;
    let mut analyzer = Analyzer::new(
        &agent,
        config.prompt.clone(),
        config.max_chunk_size,
        config.max_tokens,
    );
    if let Some(system) = &config.system_prompt {
        analyzer = analyzer.with_system_prompt(system.clone());
    }
    let outcome = analyzer.analyze(&request, &response).await;
    drop(agent);
    let _ = printer.await;
    finish(outcome)
}

/// Captures may hold arbitrary bytes; decode lossily.
fn read_capture(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn finish(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Answer(text) => {
            println!("{text}");
            Ok(())
        }
        Outcome::Cancelled => {
            eprintln!("{}", Outcome::Cancelled);
            Ok(())
        }
        Outcome::Failed(reason) => Err(anyhow::anyhow!(reason)),
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<AgentEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Intervention(note) => eprintln!("  [intervention] {note}"),
            AgentEvent::Reasoning(text) => eprintln!("\x1b[2m{text}\x1b[0m"),
            AgentEvent::Thought(text) => eprintln!("  [thought] {text}"),
            AgentEvent::ToolStart { name, arguments } => {
                eprintln!("  [tool: {name}] {}", preview(&arguments, 200));
            }
            AgentEvent::ToolEnd { name, preview } => {
                eprintln!("  [tool {name} done]");
                eprintln!("{preview}");
            }
            AgentEvent::Usage(usage) => print_usage(&usage),
            AgentEvent::ChunkStart { part, total } => {
                eprintln!("  [analyzing part {part}/{total}]");
            }
            AgentEvent::ChunkDone { part, total, .. } => {
                eprintln!("  [part {part}/{total} done]");
            }
            AgentEvent::Cancelled => eprintln!("  [cancelled]"),
            AgentEvent::Error(e) => eprintln!("Error: {e}"),
            AgentEvent::Done => {}
        }
    }
}

async fn list_tools(dispatcher: &ToolDispatcher) -> Result<()> {
    let tools = dispatcher.list_available().await;
    if tools.is_empty() {
        eprintln!("No tools available.");
        return Ok(());
    }
    for tool in &tools {
        let origin = match &tool.provenance {
            Provenance::Builtin => "builtin".to_string(),
            Provenance::Mcp { server } => format!("mcp:{server}"),
            Provenance::Script { script: Some(_) } => "script".to_string(),
            Provenance::Script { script: None } => "script (missing)".to_string(),
        };
        println!(
            "{:<24} {:<18} {}",
            tool.name,
            origin,
            preview(tool.description.lines().next().unwrap_or_default(), 80)
        );
    }
    Ok(())
}

async fn show_mcp(config: &VigilConfig, mcp: &McpManager) -> Result<()> {
    if !config.mcp.enabled {
        eprintln!("MCP is disabled.");
        return Ok(());
    }
    if config.mcp.servers.is_empty() {
        eprintln!("No MCP servers configured.");
        return Ok(());
    }

    let tools = mcp.list_tools().await;
    let statuses = mcp.statuses();
    for server in &config.mcp.servers {
        let status = statuses
            .get(&server.name)
            .cloned()
            .unwrap_or(ServerStatus::Connecting);
        let count = tools
            .iter()
            .filter(|t| matches!(&t.provenance, Provenance::Mcp { server: s } if *s == server.name))
            .count();
        println!("{:<20} {:<30} {count} tools", server.name, status.to_string());
    }
    Ok(())
}

fn print_usage(usage: &Usage) {
    eprintln!(
        "Tokens: prompt {}, completion {}, total {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
}
