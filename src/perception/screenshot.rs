// Screenshot handle carried by observations and trajectory steps.
use std::path::Path;

use base64::Engine as _;

use crate::errors::{DeskPilotError, DeskPilotResult};

/// Encoded screenshot bytes (PNG, JPEG, ...) as captured by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    bytes: Vec<u8>,
}

impl Screenshot {
    pub fn from_bytes(bytes: Vec<u8>) -> DeskPilotResult<Self> {
        if bytes.is_empty() {
            return Err(DeskPilotError::Perception("screenshot is empty".into()));
        }
        Ok(Self { bytes })
    }

    pub fn from_base64(encoded: &str) -> DeskPilotResult<Self> {
        // Accept a full data URI as well as the bare payload.
        let payload = encoded
            .split_once(";base64,")
            .map(|(_, p)| p)
            .unwrap_or(encoded);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| DeskPilotError::Perception(format!("invalid base64 screenshot: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn load(path: &Path) -> DeskPilotResult<Self> {
        let bytes = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), len = bytes.len(), "screenshot loaded");
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type sniffed from the image header, `image/png` when unknown.
    pub fn mime_type(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(format) => format.to_mime_type(),
            Err(_) => "image/png",
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` for inline image message parts.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }
}
