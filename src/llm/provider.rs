use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Model endpoint seam. Each agent owns its own provider instance.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches the config.toml key).
    fn name(&self) -> &str;

    /// One chat completion over the ordered `messages`.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse>;
}
