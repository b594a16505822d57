use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use readmere_rs::client::{McpConnector, RetryPolicy, ToolClient};
use readmere_rs::config::{EndpointConfig, Timeouts};
use readmere_rs::pipeline::{GenerationRequest, Orchestrator, ProgressBoard, ProgressSink, Style};
use readmere_rs::readme::extract_title;
use readmere_rs::server::{self, AppState};
use rmcp::model::JsonObject;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "trace")]
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Regenerate a repository README with a pipeline of MCP agents")]
struct Cli {
    #[command(flatten)]
    agents: AgentArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct AgentArgs {
    /// Base URL of the repository analyzer agent
    #[arg(long, env = "READMERE_ANALYZER_URL", default_value = "http://localhost:3002")]
    analyzer_url: String,
    /// Base URL of the code reader agent
    #[arg(long, env = "READMERE_READER_URL", default_value = "http://localhost:3003")]
    reader_url: String,
    /// Base URL of the documentation generator agent
    #[arg(long, env = "READMERE_GENERATOR_URL", default_value = "http://localhost:3004")]
    generator_url: String,
    /// Attempts per call while rate limited, the first one included
    #[arg(long, env = "READMERE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,
    /// Rate-limit backoff when the provider gives no hint, doubled per retry
    #[arg(long, env = "READMERE_BASE_DELAY_SECS", default_value_t = 10)]
    base_delay_secs: u64,
    /// Longest single rate-limit wait
    #[arg(long, env = "READMERE_MAX_BACKOFF_SECS", default_value_t = 60)]
    max_backoff_secs: u64,
    /// Time limit for GitHub-backed tools
    #[arg(long, env = "READMERE_LOOKUP_TIMEOUT_SECS", default_value_t = 60)]
    lookup_timeout_secs: u64,
    /// Time limit for LLM-backed tools
    #[arg(long, env = "READMERE_GENERATION_TIMEOUT_SECS", default_value_t = 120)]
    generation_timeout_secs: u64,
    /// Time limit for opening an agent session
    #[arg(long, env = "READMERE_CONNECT_TIMEOUT_SECS", default_value_t = 15)]
    connect_timeout_secs: u64,
}

impl AgentArgs {
    fn client(&self) -> ToolClient {
        let endpoints = EndpointConfig {
            repo_analyzer: self.analyzer_url.clone(),
            code_reader: self.reader_url.clone(),
            doc_generator: self.generator_url.clone(),
        };
        let policy = RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs(self.base_delay_secs),
            cap: Duration::from_secs(self.max_backoff_secs),
            ..RetryPolicy::default()
        };
        let timeouts = Timeouts {
            lookup: Duration::from_secs(self.lookup_timeout_secs),
            generation: Duration::from_secs(self.generation_timeout_secs),
        };
        let connector = McpConnector::new(endpoints)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs));
        ToolClient::connect(connector)
            .with_policy(policy)
            .with_timeouts(timeouts)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "READMERE_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Token used for pull requests when the request carries none
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,
    },
    /// Generate a README once and print it to stdout
    Generate {
        /// GitHub repository URL
        url: String,
        /// minimal, standard or detailed
        #[arg(long, default_value = "standard")]
        style: Style,
        /// Extra instructions for the generator
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Call a single tool by its wire name and print the raw result
    Call {
        /// Tool name, e.g. get_repo_metadata
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `generate` can print the README on stdout
    #[cfg(feature = "trace")]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let client = Arc::new(cli.agents.client());
    let outcome = match cli.command {
        Command::Serve { bind, github_token } => {
            serve(Arc::clone(&client), bind, github_token).await
        }
        Command::Generate { url, style, prompt } => {
            generate(Arc::clone(&client), url, style, prompt).await
        }
        Command::Call { tool, arguments } => call(&client, &tool, &arguments).await,
    };

    client.cleanup().await;
    outcome
}

async fn serve(
    client: Arc<ToolClient>,
    bind: SocketAddr,
    github_token: Option<String>,
) -> Result<()> {
    let orchestrator = Arc::new(Orchestrator::new(client));
    let state = AppState::new(orchestrator).with_github_token(github_token);

    server::serve(bind, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown requested, closing agent connections");
    })
    .await
}

async fn generate(
    client: Arc<ToolClient>,
    url: String,
    style: Style,
    prompt: Option<String>,
) -> Result<()> {
    let orchestrator = Orchestrator::new(client);
    let request = GenerationRequest::new(url)
        .with_style(style)
        .with_user_prompt(prompt);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling generation");
                cancel.cancel();
            }
        }
    });

    let (sink, mut rx) = ProgressSink::channel();
    let watcher = tokio::spawn(async move {
        let mut board = ProgressBoard::new();
        while let Some(event) = rx.recv().await {
            board.apply(&event);
            tracing::info!(
                stage = %event.stage,
                message = event.message.as_deref().unwrap_or(""),
                "{}",
                board.summary()
            );
        }
        board
    });

    let outcome = orchestrator.generate(&request, &sink, &cancel).await;
    drop(sink);
    let board = watcher.await.context("progress watcher panicked")?;

    if let Some(failure) = board.failure() {
        tracing::error!("generation failed: {}", failure);
    }
    let result = outcome?;
    if result.degraded {
        tracing::warn!("agents failed, README was synthesized from metadata only");
    }
    tracing::info!(
        title = extract_title(&result.readme).as_deref().unwrap_or("untitled"),
        score = result.quality.score,
        "README ready"
    );
    println!("{}", result.readme);
    Ok(())
}

async fn call(client: &ToolClient, tool: &str, arguments: &str) -> Result<()> {
    let arguments: JsonObject =
        serde_json::from_str(arguments).context("tool arguments must be a JSON object")?;
    let text = client
        .call_tool_by_name(tool, arguments, &CancellationToken::new())
        .await?;
    println!("{text}");
    Ok(())
}
