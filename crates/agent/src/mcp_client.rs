//! [`SessionConnector`] over MCP Streamable HTTP, backed by `rmcp`.

use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, Content, RawContent, ResourceContents};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::capability::Capability;
use crate::conversation::{CapabilityInvocationRequest, CapabilityInvocationResult, Payload};
use crate::error::SessionError;
use crate::session::{CapabilitySession, SessionConnector, SessionTransport};

const DEFAULT_PATH: &str = "/mcp";

#[derive(Clone, Debug)]
pub struct McpConnector {
    request_timeout: Duration,
}

impl Default for McpConnector {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(300) }
    }
}

impl McpConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

/// Normalizes a server address to the MCP endpoint URI.
///
/// `host:port` gets an `http://` scheme, and an address without a path is
/// pointed at `/mcp`.
pub fn endpoint_uri(address: &str) -> Result<String, SessionError> {
    let address = address.trim();
    let with_scheme =
        if address.contains("://") { address.to_string() } else { format!("http://{address}") };

    let mut url = reqwest::Url::parse(&with_scheme).map_err(|error| SessionError::Connect {
        address: address.to_string(),
        message: error.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SessionError::Connect {
            address: address.to_string(),
            message: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_PATH);
    }
    Ok(url.to_string())
}

/// HTTP client bound to one MCP endpoint.
pub struct HttpTransport {
    uri: String,
    client: Option<reqwest::Client>,
}

impl HttpTransport {
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn close(&mut self) -> Result<(), SessionError> {
        if self.client.take().is_some() {
            debug!(event_name = "mcp.transport.closed", uri = %self.uri, "http client released");
        }
        Ok(())
    }
}

pub struct McpSession {
    service: Option<RunningService<RoleClient, ()>>,
}

impl McpSession {
    fn service(&self) -> Result<&RunningService<RoleClient, ()>, SessionError> {
        self.service.as_ref().ok_or(SessionError::Closed)
    }
}

#[async_trait]
impl SessionConnector for McpConnector {
    type Transport = HttpTransport;
    type Session = McpSession;

    async fn connect(&self, address: &str) -> Result<HttpTransport, SessionError> {
        let uri = endpoint_uri(address)?;
        let client = reqwest::Client::builder().timeout(self.request_timeout).build().map_err(
            |error| SessionError::Connect { address: address.to_string(), message: error.to_string() },
        )?;
        Ok(HttpTransport { uri, client: Some(client) })
    }

    async fn initialize(&self, transport: &mut HttpTransport) -> Result<McpSession, SessionError> {
        let client = transport.client.clone().ok_or(SessionError::Closed)?;
        let http = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(transport.uri.clone()),
        );

        let service = ()
            .serve(http)
            .await
            .map_err(|error| SessionError::Initialize(error.to_string()))?;

        if let Some(peer) = service.peer_info() {
            info!(
                event_name = "mcp.session.initialized",
                uri = %transport.uri,
                server = %peer.server_info.name,
                version = %peer.server_info.version,
                "connected to MCP server"
            );
        }
        Ok(McpSession { service: Some(service) })
    }
}

#[async_trait]
impl CapabilitySession for McpSession {
    async fn list_capabilities(&self) -> Result<Vec<Capability>, SessionError> {
        let tools = self
            .service()?
            .list_all_tools()
            .await
            .map_err(|error| SessionError::Discovery(error.to_string()))?;

        Ok(tools
            .into_iter()
            .map(|tool| Capability {
                name: tool.name.to_string(),
                description: tool.description.as_deref().unwrap_or_default().to_string(),
                input_schema: Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }

    async fn invoke(
        &self,
        request: &CapabilityInvocationRequest,
    ) -> Result<CapabilityInvocationResult, SessionError> {
        let result = self
            .service()?
            .call_tool(CallToolRequestParam {
                name: request.capability_name.clone().into(),
                arguments: Some(request.arguments.clone()),
            })
            .await
            .map_err(|error| SessionError::Invoke {
                capability: request.capability_name.clone(),
                message: error.to_string(),
            })?;

        let mut content: Vec<Payload> =
            result.content.iter().map(|item| Payload::Text(content_to_text(item))).collect();
        if let Some(structured) = result.structured_content {
            content.push(Payload::Structured(structured));
        }

        Ok(CapabilityInvocationResult {
            capability_name: request.capability_name.clone(),
            content,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if let Some(service) = self.service.take() {
            service.cancel().await.map_err(|error| SessionError::Close(error.to_string()))?;
        }
        Ok(())
    }
}

/// Text parts pass through; other kinds become a `[kind]` placeholder.
fn content_to_text(item: &Content) -> String {
    match &item.raw {
        RawContent::Text(text) => text.text.clone(),
        RawContent::Image(_) => "[image]".to_string(),
        RawContent::Audio(_) => "[audio]".to_string(),
        RawContent::Resource(embedded) => match &embedded.resource {
            ResourceContents::TextResourceContents { text, .. } if !text.is_empty() => {
                text.clone()
            }
            _ => "[resource]".to_string(),
        },
        _ => "[resource]".to_string(),
    }
}
