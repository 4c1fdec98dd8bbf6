use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde::Serialize;

use ackbucket_core::config::ControllerConfig;
use ackbucket_core::KubectlCli;

use crate::server::BucketMcpServer;

pub const MCP_PATH: &str = "/mcp";

#[derive(Clone)]
pub struct HealthState {
    controller: ControllerConfig,
}

impl HealthState {
    pub fn new(controller: ControllerConfig) -> Self {
        Self { controller }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub controller: HealthCheck,
    pub checked_at: String,
}

/// `/mcp` serves MCP over Streamable HTTP; `/health` reports readiness.
pub fn router(server: BucketMcpServer, health_state: HealthState) -> Router {
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    Router::new()
        .route("/health", get(health))
        .with_state(health_state)
        .nest_service(MCP_PATH, mcp)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let controller = controller_check(&state.controller);
    let ready = controller.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "ackbucket-mcp runtime initialized".to_string(),
        },
        controller,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn controller_check(config: &ControllerConfig) -> HealthCheck {
    match KubectlCli::from_config(config) {
        Ok(cli) if cli.binary().is_file() => HealthCheck {
            status: "ready",
            detail: format!("kubectl found at {}", cli.binary().display()),
        },
        Ok(cli) => HealthCheck {
            status: "degraded",
            detail: format!("kubectl path {} does not exist", cli.binary().display()),
        },
        Err(error) => HealthCheck { status: "degraded", detail: error.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{extract::State, Json};
    use tower::ServiceExt;

    use ackbucket_core::config::{AppConfig, ControllerConfig};
    use ackbucket_core::{KubectlCli, ResourceController, RetryingCreator};

    use super::{health, router, HealthState};
    use crate::server::BucketMcpServer;

    fn controller_config(kubectl_path: PathBuf) -> ControllerConfig {
        ControllerConfig { kubectl_path: Some(kubectl_path), ..AppConfig::default().controller }
    }

    #[tokio::test]
    async fn health_is_ready_when_controller_binary_exists() {
        let existing = std::env::current_exe().expect("test binary path");

        let (status, Json(payload)) =
            health(State(HealthState::new(controller_config(existing)))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.controller.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_is_degraded_when_controller_binary_is_missing() {
        let missing = PathBuf::from("/nonexistent/ackbucket/kubectl");

        let (status, Json(payload)) =
            health(State(HealthState::new(controller_config(missing)))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(payload.controller.detail.contains("does not exist"));
    }

    #[tokio::test]
    async fn router_serves_health_route() {
        let config = controller_config(std::env::current_exe().expect("test binary path"));
        let cli = KubectlCli::from_config(&config).expect("cli");
        let server = BucketMcpServer::new(
            RetryingCreator::new(ResourceController::new(Arc::new(cli)), "bucket"),
            3,
        );
        let app = router(server, HealthState::new(config));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
