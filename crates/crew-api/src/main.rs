//! `crew` - sandboxed tool service and refactoring pipeline
//!
//! Subcommands:
//! - `tool-server`: serve the sandboxed tool endpoints over one root
//! - `api`: serve the submission interface
//! - `run`: run the pipeline once over a local file and print the result

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crew_api::wire::{RefactorResponse, DEFAULT_FILENAME};
use crew_core::config::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_TEST_COMMAND, DEFAULT_TOOLS_URL};
use crew_core::CrewConfig;
use crew_sandbox::config::{DEFAULT_EXEC_TIMEOUT, DEFAULT_FAILURE_OUTPUT_LIMIT, DEFAULT_MAX_TIMEOUT};
use crew_sandbox::{SandboxConfig, ToolService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "crew", version, about = "Sandboxed tool service and refactoring agent pipeline")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CREW_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the sandboxed tool endpoints
    ToolServer(ToolServerArgs),
    /// Serve the submission interface
    Api(ApiArgs),
    /// Run the pipeline once over a local file
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct ToolServerArgs {
    /// Address to listen on
    #[arg(long, env = "CREW_TOOLS_BIND", default_value = "127.0.0.1:8001")]
    bind: SocketAddr,

    /// Directory all operations are confined to
    #[arg(long, env = "CREW_SANDBOX_ROOT", default_value = "./code")]
    root: PathBuf,

    /// Default command timeout in seconds
    #[arg(long, env = "CREW_EXEC_TIMEOUT", default_value_t = DEFAULT_EXEC_TIMEOUT.as_secs())]
    exec_timeout: u64,

    /// Upper bound for requested command timeouts in seconds
    #[arg(long, env = "CREW_MAX_TIMEOUT", default_value_t = DEFAULT_MAX_TIMEOUT.as_secs())]
    max_timeout: u64,

    /// Characters of output returned for a failed command
    #[arg(long, env = "CREW_OUTPUT_LIMIT", default_value_t = DEFAULT_FAILURE_OUTPUT_LIMIT)]
    output_limit: usize,

    /// Scanner command line
    #[arg(long, env = "CREW_SCANNER", default_value = "bandit")]
    scanner: String,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Base URL of the Ollama-compatible backend
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama_base_url: String,

    /// Completion model
    #[arg(long, env = "CREW_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, env = "CREW_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Base URL of the tool service
    #[arg(long, env = "CREW_TOOLS_URL", default_value = DEFAULT_TOOLS_URL)]
    tools_url: String,

    /// Directory for session documents; in-memory when unset
    #[arg(long, env = "CREW_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Command run by the `run_tests` tool
    #[arg(long, env = "CREW_TEST_COMMAND", default_value = DEFAULT_TEST_COMMAND)]
    test_command: String,

    /// Timeout for the test command in seconds
    #[arg(long, env = "CREW_TEST_TIMEOUT")]
    test_timeout: Option<u64>,

    /// Tool requests an agent may make per step
    #[arg(long, env = "CREW_MAX_ITERATIONS", default_value_t = 8)]
    max_iterations: usize,

    /// Extra attempts for steps failing with retryable tool errors
    #[arg(long, env = "CREW_STEP_RETRIES", default_value_t = 0)]
    step_retries: u32,

    /// Pause between step attempts in milliseconds
    #[arg(long, env = "CREW_RETRY_BACKOFF_MS", default_value_t = 2000)]
    retry_backoff_ms: u64,
}

impl PipelineArgs {
    fn config(&self) -> CrewConfig {
        CrewConfig::new()
            .with_ollama_base_url(&self.ollama_base_url)
            .with_model(&self.model)
            .with_temperature(self.temperature)
            .with_tools_url(&self.tools_url)
            .with_test_command(&self.test_command)
            .with_test_timeout_secs(self.test_timeout)
            .with_max_iterations(self.max_iterations)
            .with_step_retries(self.step_retries, Duration::from_millis(self.retry_backoff_ms))
    }
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// Address to listen on
    #[arg(long, env = "CREW_API_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Source file to submit
    file: PathBuf,

    /// Filename inside the session directory; defaults to the file's name
    #[arg(long)]
    filename: Option<String>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn tool_server(args: ToolServerArgs) -> Result<()> {
    let config = SandboxConfig::new(&args.root)
        .with_default_timeout(Duration::from_secs(args.exec_timeout))
        .with_max_timeout(Duration::from_secs(args.max_timeout))
        .with_failure_output_limit(args.output_limit)
        .with_scanner(args.scanner);
    let service = ToolService::new(config)
        .with_context(|| format!("opening sandbox root {}", args.root.display()))?;

    let (addr, server) = crew_sandbox::serve(service.clone(), args.bind, shutdown_signal())
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(%addr, root = %service.root().path().display(), "tool service listening");
    server.await;
    Ok(())
}

async fn api(args: ApiArgs) -> Result<()> {
    let config = args.pipeline.config();
    let orchestrator = crew_api::build_orchestrator(&config, args.pipeline.session_dir.clone())
        .await
        .context("configuring the pipeline")?;

    let (addr, server) = crew_api::serve(orchestrator, args.bind, shutdown_signal())
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(%addr, "submission API listening");
    server.await;
    Ok(())
}

async fn run(args: RunArgs) -> Result<bool> {
    let code = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let filename = match args.filename {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .map_or_else(|| DEFAULT_FILENAME.to_string(), |n| n.to_string_lossy().into_owned()),
    };

    let config = args.pipeline.config();
    let orchestrator = crew_api::build_orchestrator(&config, args.pipeline.session_dir.clone())
        .await
        .context("configuring the pipeline")?;

    let report = orchestrator
        .submit(&code, &filename)
        .await
        .context("running the pipeline")?;
    let body = serde_json::to_string_pretty(&RefactorResponse::from(&report))?;
    println!("{body}");
    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    crew_api::telemetry::init(cli.log_json);

    match cli.command {
        Command::ToolServer(args) => tool_server(args).await,
        Command::Api(args) => api(args).await,
        Command::Run(args) => {
            if run(args).await? {
                Ok(())
            } else {
                std::process::exit(1)
            }
        }
    }
}
