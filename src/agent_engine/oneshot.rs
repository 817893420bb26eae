use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::DeskPilotResult;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::active_provider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::perception::screenshot::Screenshot;
use crate::protocol::action::{self, Action};
use crate::protocol::parser::parse_response;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OneShotPrediction {
    pub raw_output: String,
    pub reasoning: Option<String>,
    pub action: Action,
}

/// Single-call predictor: instruction plus screenshot in, one action out.
/// Keeps no history and does not retry.
pub struct OneShotPredictor {
    provider: Arc<dyn LlmProvider>,
    call_cfg: CallConfig,
    system_prompt: String,
}

impl OneShotPredictor {
    pub fn new(provider: Arc<dyn LlmProvider>, call_cfg: CallConfig, system_prompt: String) -> Self {
        Self {
            provider,
            call_cfg,
            system_prompt,
        }
    }

    pub fn from_config(config: &AppConfig, config_dir: Option<&Path>) -> DeskPilotResult<Self> {
        let (provider, model) = active_provider(&config.llm)?;
        let system_prompt = config.prompts.render_system_prompt(config_dir)?;
        Ok(Self::new(provider, config.decoding.call_config(&model), system_prompt))
    }

    pub async fn predict(&self, instruction: &str, screenshot: &Screenshot) -> DeskPilotResult<OneShotPrediction> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_image(screenshot.to_data_uri(), Some(instruction.to_string())),
        ];
        let response = self.provider.chat(messages, &self.call_cfg).await?;
        let raw_output = response.content.trim().to_string();

        let parsed = parse_response(&raw_output);
        let candidate = parsed.require_action()?;
        let action = action::validate(candidate)?;
        tracing::info!(action = action.name(), "one-shot prediction");

        Ok(OneShotPrediction {
            reasoning: parsed.reasoning.clone(),
            raw_output,
            action,
        })
    }
}
