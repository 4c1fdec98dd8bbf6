//! ackbucket MCP server
//!
//! Exposes bucket creation to MCP clients as the `create-storage-bucket`
//! tool, served over Streamable HTTP.
//!
//! ## Architecture
//!
//! - `BucketMcpServer`: tool router and `ServerHandler` over a `RetryingCreator`
//! - `http`: axum router with `/mcp` and `/health`
//! - `serve`: binds the configured address and runs until shutdown

pub mod http;
mod server;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use ackbucket_core::config::{AppConfig, ConfigError};
use ackbucket_core::{ControllerError, KubectlCli, ResourceController, RetryingCreator};

pub use server::{BucketMcpServer, CreateBucketParams, CREATE_BUCKET_TOOL};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: std::io::Error },
    #[error("http server terminated: {0}")]
    Serve(#[source] std::io::Error),
}

/// Wires `kubectl`, the controller, and the creator from configuration.
pub fn build_server(config: &AppConfig) -> Result<BucketMcpServer, ServerError> {
    let cli = KubectlCli::from_config(&config.controller)?;
    info!(
        event_name = "system.bootstrap.controller_resolved",
        correlation_id = "bootstrap",
        kubectl = %cli.binary().display(),
        context = config.controller.context.as_deref().unwrap_or("<current>"),
        "controller CLI resolved"
    );

    let creator = RetryingCreator::new(
        ResourceController::new(Arc::new(cli)),
        config.controller.name_prefix.clone(),
    );
    Ok(BucketMcpServer::new(creator, config.controller.max_retries))
}

/// Serves `/mcp` and `/health` on the configured address until `shutdown`
/// resolves.
pub async fn serve<F>(config: AppConfig, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = build_server(&config)?;
    let app = http::router(server, http::HealthState::new(config.controller.clone()));

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind { address: address.clone(), source })?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        mcp_path = http::MCP_PATH,
        "ackbucket-mcp listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await.map_err(ServerError::Serve)?;

    info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "ackbucket-mcp stopped"
    );
    Ok(())
}
