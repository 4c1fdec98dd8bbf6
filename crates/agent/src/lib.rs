//! Agent side of ackbucket: turns a natural-language request into capability
//! calls against a remote MCP server.
//!
//! # Architecture
//!
//! One query runs through a bounded loop:
//! 1. **Discovery** (`capability`) - list the server's capabilities once per session
//! 2. **Inference** (`llm`, `anthropic`) - ask the model for text and/or invocation requests
//! 3. **Dispatch** (`orchestrator`) - invoke each requested capability in order and
//!    re-infer once per result
//!
//! The remote session is scoped by `session::with_session`, which guarantees
//! teardown on every exit path. `mcp_client` adapts `rmcp` to that contract.
//!
//! Follow-up responses are never rescanned for invocation requests, so the
//! number of remote calls per query is bounded by the invocation blocks in
//! the first response.

pub mod anthropic;
pub mod capability;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod mcp_client;
pub mod orchestrator;
pub mod session;

pub use anthropic::AnthropicEngine;
pub use capability::{Capability, CapabilityRegistry};
pub use conversation::{
    CapabilityInvocationRequest, CapabilityInvocationResult, ContentBlock, ConversationMessage,
    MessageContent, Payload, Role,
};
pub use error::{AgentError, InferenceError, SessionError};
pub use llm::InferenceEngine;
pub use mcp_client::{McpConnector, McpSession};
pub use orchestrator::ConversationOrchestrator;
pub use session::{with_session, CapabilitySession, SessionConnector, SessionScope, SessionTransport};
