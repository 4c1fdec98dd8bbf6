//! ackbucket MCP server binary
//!
//! ## Usage
//!
//! ```bash
//! # Listen on all interfaces, port 8080
//! ackbucket-mcp
//!
//! # Custom bind address and config file
//! ackbucket-mcp --host 127.0.0.1 --port 9000 --config ackbucket.toml
//!
//! # Target a specific kube context
//! ACKBUCKET_CONTROLLER_CONTEXT=kind-ack ackbucket-mcp
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use ackbucket_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use ackbucket_core::logging::{self, LogTarget};

#[derive(Debug, Parser)]
#[command(name = "ackbucket-mcp", version, about = "MCP server that creates S3 buckets through ACK")]
struct Args {
    /// Address to bind. Defaults to all interfaces.
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on. Defaults to 8080.
    #[arg(long)]
    port: Option<u16>,
    /// Path to an ackbucket TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(LoadOptions {
        require_file: args.config.is_some(),
        config_path: args.config,
        overrides: ConfigOverrides {
            server_host: args.host,
            server_port: args.port,
            ..ConfigOverrides::default()
        },
    })?;
    logging::init(&config.logging, LogTarget::Stdout);

    ackbucket_mcp::serve(config, wait_for_shutdown()).await?;
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(event_name = "system.server.signal_error", error = %error, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
}
