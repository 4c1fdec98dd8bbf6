use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessageContent {
    Text(String),
    InvocationResult(CapabilityInvocationResult),
}

/// One entry of the per-query conversation. Messages are only ever appended.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ConversationMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    /// Invocation results travel back to the model as user turns.
    pub fn invocation_result(result: CapabilityInvocationResult) -> Self {
        Self { role: Role::User, content: MessageContent::InvocationResult(result) }
    }

    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::InvocationResult(result) => result.to_text(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityInvocationRequest {
    pub capability_name: String,
    pub arguments: Map<String, Value>,
}

impl CapabilityInvocationRequest {
    pub fn new(capability_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self { capability_name: capability_name.into(), arguments }
    }

    /// Compact JSON rendering of the arguments, used in trace lines.
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Structured(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityInvocationResult {
    pub capability_name: String,
    pub content: Vec<Payload>,
    pub is_error: bool,
}

impl CapabilityInvocationResult {
    pub fn text(capability_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            capability_name: capability_name.into(),
            content: vec![Payload::Text(text.into())],
            is_error: false,
        }
    }

    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .map(|payload| match payload {
                Payload::Text(text) => text.clone(),
                Payload::Structured(value) => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One block of an inference response, in the order the engine produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Invocation(CapabilityInvocationRequest),
}
