//! Anthropic Messages API client.
//!
//! POSTs to `/v1/messages`. Rate limiting (429), overload (529), and server
//! errors are retried with exponential backoff, capped at [`MAX_BACKOFF`];
//! other client errors fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use ackbucket_core::config::InferenceConfig;

use crate::capability::Capability;
use crate::conversation::{CapabilityInvocationRequest, ContentBlock, ConversationMessage};
use crate::error::InferenceError;
use crate::llm::InferenceEngine;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const EMPTY_CONTENT: &str = "(no content)";
/// Longest single wait between attempts, including server-sent `retry-after`.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct AnthropicEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl AnthropicEngine {
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let api_key = config.require_api_key()?.clone();
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs(1),
            max_backoff: MAX_BACKOFF,
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(
        &'a self,
        conversation: &[ConversationMessage],
        capabilities: Option<&'a [Capability]>,
    ) -> MessagesRequest<'a> {
        let messages = conversation
            .iter()
            .map(|message| {
                let text = message.text();
                WireMessage {
                    role: message.role.as_str(),
                    content: if text.trim().is_empty() { EMPTY_CONTENT.to_string() } else { text },
                }
            })
            .collect();

        let tools = capabilities.filter(|caps| !caps.is_empty()).map(|caps| {
            caps.iter()
                .map(|capability| WireTool {
                    name: &capability.name,
                    description: &capability.description,
                    input_schema: &capability.input_schema,
                })
                .collect()
        });

        MessagesRequest { model: &self.model, max_tokens: self.max_tokens, messages, tools }
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<String, InferenceError> {
        let mut backoff = self.initial_backoff.min(self.max_backoff);
        let mut last_error = String::from("no attempt made");
        let attempts = self.max_retries + 1;

        for attempt in 0..attempts {
            if attempt > 0 {
                warn!(
                    event_name = "agent.inference.retry",
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    last_error = %last_error,
                    "retrying inference request"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.max_backoff);
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    last_error = error.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                {
                    backoff = Duration::from_secs(retry_after).min(self.max_backoff);
                }
                last_error = "rate limited (429)".to_string();
                continue;
            }
            if status.as_u16() == 529 {
                last_error = "overloaded (529)".to_string();
                continue;
            }
            if status.is_server_error() {
                last_error = format!("server error ({status})");
                continue;
            }

            let body = response.text().await?;
            if status.is_client_error() {
                return Err(InferenceError::Status { status: status.as_u16(), body });
            }
            return Ok(body);
        }

        Err(InferenceError::Exhausted { attempts, last_error })
    }
}

fn parse_response(body: &str) -> Result<Vec<ContentBlock>, InferenceError> {
    let value: Value = serde_json::from_str(body)?;
    if value.get("type").and_then(Value::as_str) == Some("error") {
        let envelope: ErrorEnvelope = serde_json::from_value(value)?;
        return Err(InferenceError::Api(envelope.error.message));
    }

    let response: MessagesResponse = serde_json::from_value(value)?;
    let blocks = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            WireBlock::Text { text } => Some(ContentBlock::Text(text)),
            WireBlock::ToolUse { name, input } => {
                let arguments = match input {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Some(ContentBlock::Invocation(CapabilityInvocationRequest::new(name, arguments)))
            }
            WireBlock::Unsupported => None,
        })
        .collect();
    Ok(blocks)
}

#[async_trait]
impl InferenceEngine for AnthropicEngine {
    async fn infer(
        &self,
        conversation: &[ConversationMessage],
        capabilities: Option<&[Capability]>,
    ) -> Result<Vec<ContentBlock>, InferenceError> {
        let request = self.build_request(conversation, capabilities);
        debug!(
            event_name = "agent.inference.request",
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "sending inference request"
        );

        let body = self.send(&request).await?;
        parse_response(&body)
    }
}
