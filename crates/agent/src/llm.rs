use async_trait::async_trait;

use crate::capability::Capability;
use crate::conversation::{ContentBlock, ConversationMessage};
use crate::error::InferenceError;

/// Maps conversation state to an ordered sequence of response blocks.
///
/// `capabilities` is `None` when the caller does not want the engine to
/// request invocations.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn infer(
        &self,
        conversation: &[ConversationMessage],
        capabilities: Option<&[Capability]>,
    ) -> Result<Vec<ContentBlock>, InferenceError>;
}
