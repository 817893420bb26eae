use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text("assistant", text)
    }

    /// A user turn made of an image followed by optional text.
    pub fn user_image(data_uri: String, text: Option<String>) -> Self {
        let mut parts = vec![ContentPart::ImageUrl {
            image_url: ImageUrl { url: data_uri },
        }];
        if let Some(text) = text {
            parts.push(ContentPart::Text { text });
        }
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }

    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::Parts(vec![ContentPart::Text { text: text.into() }]),
        }
    }

    /// Concatenated text parts, ignoring images.
    pub fn text_content(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn image_count(&self) -> usize {
        match &self.content {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Per-call decoding configuration. Fixed seed keeps decoding deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    pub model: String,
    pub stream: bool,
    pub temperature: f64,
    pub top_p: f64,
    /// `-1` disables top-k sampling.
    pub top_k: i64,
    pub max_tokens: u32,
    pub seed: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            stream: false,
            temperature: 0.0,
            top_p: 1.0,
            top_k: -1,
            max_tokens: 2048,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    /// Separate reasoning channel exposed by some endpoints.
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub kind: StreamChunkKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunkKind {
    Reasoning,
    Content,
    Done,
}

/// JSON copy of `messages` with every image URL replaced by `placeholder`.
pub fn mask_image_urls(messages: &[ChatMessage], placeholder: &str) -> serde_json::Value {
    let masked: Vec<ChatMessage> = messages
        .iter()
        .cloned()
        .map(|mut msg| {
            if let MessageContent::Parts(parts) = &mut msg.content {
                for part in parts.iter_mut() {
                    if let ContentPart::ImageUrl { image_url } = part {
                        image_url.url = placeholder.to_string();
                    }
                }
            }
            msg
        })
        .collect();
    serde_json::to_value(masked).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_in_openai_shape() {
        let msg = ChatMessage::user_image("data:image/png;base64,AAAA".into(), Some("goal".into()));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "image_url");
        assert_eq!(value["content"][0]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(value["content"][1]["type"], "text");
        assert_eq!(msg.image_count(), 1);
        assert_eq!(msg.text_content(), "goal");
    }

    #[test]
    fn masking_hides_image_payloads_only() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user_image("data:image/png;base64,AAAA".into(), None),
        ];
        let masked = mask_image_urls(&messages, "[IMAGE_DATA]");
        assert_eq!(masked[0]["content"][0]["text"], "sys");
        assert_eq!(masked[1]["content"][0]["image_url"]["url"], "[IMAGE_DATA]");
        // original untouched
        assert_eq!(messages[1].content, ChatMessage::user_image("data:image/png;base64,AAAA".into(), None).content);
    }
}
