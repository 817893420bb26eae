use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::ProviderEntry;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser::SseAccumulator;
use crate::llm::types::{mask_image_urls, CallConfig, ChatMessage, LlmResponse};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Build from a config entry. The API key is read from
    /// `DESKPILOT_<ID>_API_KEY`, falling back to the entry's `api_key`.
    pub fn from_entry(id: &str, entry: &ProviderEntry) -> DeskPilotResult<Self> {
        let api_key = std::env::var(format!("DESKPILOT_{}_API_KEY", id.to_uppercase()))
            .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = entry.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            id: id.to_string(),
            api_base: entry.api_base.clone(),
            api_key,
            client,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], cfg: &CallConfig) -> serde_json::Value {
        serde_json::json!({
            "model": cfg.model,
            "messages": messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "top_p": cfg.top_p,
            "top_k": cfg.top_k,
            "max_tokens": cfg.max_tokens,
            "seed": cfg.seed,
            "frequency_penalty": 0.0,
            "presence_penalty": 0.0,
            "repetition_penalty": 1.0,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse> {
        let body = self.request_body(&messages, cfg);

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            "sending LLM request"
        );
        tracing::debug!(
            body = %mask_image_urls(&messages, "<omitted_base64_image>"),
            "request messages (sanitized, base64 omitted)"
        );

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Handle SSE streaming response, accumulating the full completion.
    async fn handle_stream(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = SseAccumulator::new();

        while let Some(result) = byte_stream.next().await {
            acc.push(&result?)?;
            if acc.is_done() {
                break;
            }
        }
        let resp = acc.finish()?;

        tracing::info!(
            provider = %self.id,
            content_len = resp.content.len(),
            reasoning_len = resp.reasoning.len(),
            "LLM stream complete"
        );
        Ok(resp)
    }

    /// Handle a non-streaming JSON response.
    async fn handle_json(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let message = &json["choices"][0]["message"];

        let Some(content) = message["content"].as_str() else {
            return Err(DeskPilotError::LlmProvider(format!(
                "response has no message content: {}",
                json
            )));
        };
        let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            reasoning_len = reasoning.len(),
            "LLM JSON response received"
        );

        Ok(LlmResponse {
            content: content.to_string(),
            reasoning,
        })
    }
}
