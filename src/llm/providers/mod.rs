pub mod openai_compatible;

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::DeskPilotResult;
use crate::llm::provider::LlmProvider;
use openai_compatible::OpenAiCompatibleProvider;

/// Build the active provider from config, returning it with its default model.
pub fn active_provider(config: &LlmConfig) -> DeskPilotResult<(Arc<dyn LlmProvider>, String)> {
    let entry = config.active_entry()?;
    let provider = OpenAiCompatibleProvider::from_entry(&config.active_provider, entry)?;
    tracing::debug!(
        provider = %config.active_provider,
        model = %entry.model,
        api_base = %entry.api_base,
        "provider resolved"
    );
    Ok((Arc::new(provider), entry.model.clone()))
}
