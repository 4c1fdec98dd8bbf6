pub mod chat;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use futures::FutureExt;
use tokio::io::BufReader;
use tracing::info;

use ackbucket_agent::{
    with_session, AnthropicEngine, CapabilityRegistry, ConversationOrchestrator, McpConnector,
};
use ackbucket_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use ackbucket_core::logging::{self, LogTarget};

const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "ackbucket",
    about = "Interactive client that provisions S3 buckets through an ackbucket MCP server",
    after_help = "Examples:\n  ackbucket http://localhost:8080/mcp\n  ackbucket localhost:8080 --model claude-3-5-sonnet-20241022"
)]
pub struct Cli {
    /// MCP server address, e.g. `http://localhost:8080/mcp` or `localhost:8080`.
    pub address: String,
    /// Path to an ackbucket TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override the inference model.
    #[arg(long)]
    pub model: Option<String>,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                inference_model: self.model.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub async fn run() -> ExitCode {
    run_with(Cli::parse()).await
}

pub async fn run_with(cli: Cli) -> ExitCode {
    let config = match AppConfig::load(cli.load_options()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    logging::init(&config.logging, LogTarget::Stderr);

    let engine = match AnthropicEngine::from_config(&config.inference) {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(
        event_name = "client.started",
        address = %cli.address,
        model = engine.model(),
        "ackbucket client starting"
    );

    let connector = McpConnector::default();
    let outcome = with_session(&connector, &cli.address, move |session| {
        async move {
            let registry = CapabilityRegistry::discover(session).await?;
            let orchestrator = ConversationOrchestrator::new(engine, registry);
            let mut stdout = tokio::io::stdout();
            let answered = chat::chat_loop(
                &orchestrator,
                session,
                BufReader::new(tokio::io::stdin()),
                &mut stdout,
            )
            .await?;
            Ok::<usize, anyhow::Error>(answered)
        }
        .boxed()
    })
    .await;

    match outcome {
        Ok(Ok(answered)) => {
            info!(event_name = "client.stopped", answered, "ackbucket client stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(error)) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}
