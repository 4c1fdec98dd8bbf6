//! MCP server exposing the `create-storage-bucket` tool.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData, ServerHandler};
use serde::Deserialize;
use tracing::info;

use ackbucket_core::RetryingCreator;

pub const CREATE_BUCKET_TOOL: &str = "create-storage-bucket";

const INSTRUCTIONS: &str = "ackbucket MCP server. Creates Amazon S3 buckets by applying ACK \
`Bucket` manifests through kubectl. Each request is validated with a server-side dry run \
before it is applied; name conflicts are retried with a numeric suffix.";

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct CreateBucketParams {
    /// Bucket name. A random `bucket-xxxxxxxx` name is used when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Attempts allowed when the name is already taken. Defaults to 3.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Clone)]
pub struct BucketMcpServer {
    creator: Arc<RetryingCreator>,
    default_max_retries: u32,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl BucketMcpServer {
    pub fn new(creator: RetryingCreator, default_max_retries: u32) -> Self {
        Self { creator: Arc::new(creator), default_max_retries, tool_router: Self::tool_router() }
    }

    /// Create an S3 bucket through the ACK controller. Always returns a
    /// textual report; failures are part of the report, not protocol errors.
    #[tool(
        name = "create-storage-bucket",
        description = "Create an S3 bucket using the ACK S3 controller. Validates the manifest \
                       with a server-side dry run, then applies it. Retries with a numbered \
                       name when the bucket name already exists."
    )]
    async fn create_storage_bucket(
        &self,
        Parameters(params): Parameters<CreateBucketParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let max_retries = params.max_retries.unwrap_or(self.default_max_retries);
        info!(
            event_name = "mcp.tool.create_storage_bucket",
            requested_name = params.name.as_deref().unwrap_or("<generated>"),
            max_retries,
            "create-storage-bucket called"
        );

        let report = self.creator.create(params.name.as_deref(), max_retries).await;
        Ok(CallToolResult::success(vec![Content::text(report.to_string())]))
    }
}

#[tool_handler]
impl ServerHandler for BucketMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ackbucket_core::{
        CommandOutput, ControllerCli, ControllerError, Manifest, ResourceController,
        RetryingCreator, SubmitMode,
    };
    use async_trait::async_trait;
    use rmcp::handler::server::wrapper::Parameters;
    use rmcp::model::RawContent;
    use rmcp::ServerHandler;

    use super::{BucketMcpServer, CreateBucketParams, CREATE_BUCKET_TOOL};

    struct AlwaysConflicts;

    #[async_trait]
    impl ControllerCli for AlwaysConflicts {
        async fn submit(
            &self,
            _manifest: &Manifest,
            _mode: SubmitMode,
        ) -> Result<CommandOutput, ControllerError> {
            Ok(CommandOutput::failed(1, "already exists"))
        }
    }

    fn server() -> BucketMcpServer {
        let controller = ResourceController::new(Arc::new(AlwaysConflicts));
        BucketMcpServer::new(RetryingCreator::new(controller, "bucket"), 3)
    }

    #[test]
    fn info_advertises_tools_and_instructions() {
        let info = server().get_info();

        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.as_deref().is_some_and(|text| text.contains("ACK")));
    }

    #[test]
    fn router_registers_single_tool() {
        let tools = server().tool_router.list_all();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, CREATE_BUCKET_TOOL);
    }

    #[tokio::test]
    async fn exhausted_retries_are_a_successful_call() {
        let result = server()
            .create_storage_bucket(Parameters(CreateBucketParams {
                name: Some("logs".to_string()),
                max_retries: Some(2),
            }))
            .await
            .expect("tool call should not error");

        assert_ne!(result.is_error, Some(true));
        match &result.content[0].raw {
            RawContent::Text(text) => {
                assert!(text.text.starts_with("Failed to create bucket after 2 attempts"))
            }
            _ => panic!("expected text content"),
        }
    }
}
