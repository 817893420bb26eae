use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::types::{LlmResponse, StreamChunk, StreamChunkKind};

/// Accumulates a streamed completion from raw body bytes.
///
/// Bytes are buffered until a full line arrives, so a UTF-8 sequence split
/// across network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    line_buf: Vec<u8>,
    response: LlmResponse,
    done: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk. Provider errors embedded in the stream abort.
    pub fn push(&mut self, bytes: &[u8]) -> DeskPilotResult<()> {
        if self.done {
            return Ok(());
        }
        self.line_buf.extend_from_slice(bytes);
        while let Some(pos) = self.line_buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            self.apply_line(&line)?;
            if self.done {
                self.line_buf.clear();
                break;
            }
        }
        Ok(())
    }

    /// Flush a trailing line without a newline and return the completion.
    pub fn finish(mut self) -> DeskPilotResult<LlmResponse> {
        if !self.done && !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.apply_line(&line)?;
        }
        Ok(self.response)
    }

    fn apply_line(&mut self, raw: &[u8]) -> DeskPilotResult<()> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match parse_sse_line(line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Reasoning => self.response.reasoning.push_str(&chunk.content),
                StreamChunkKind::Content => self.response.content.push_str(&chunk.content),
                StreamChunkKind::Done => self.done = true,
            },
            Ok(None) => {}
            Err(e @ DeskPilotError::LlmProvider(_)) => return Err(e),
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
        Ok(())
    }
}

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> DeskPilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let data = match line.strip_prefix("data:") {
        Some(d) => d.trim(),
        None => return Ok(None),
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| DeskPilotError::SseParsing(e.to_string()))?;

    if let Some(err) = json.get("error") {
        return Err(DeskPilotError::LlmProvider(format!("stream error: {err}")));
    }

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // Reasoning content (some models like DeepSeek expose this)
    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        if !reasoning.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Reasoning,
                content: reasoning.to_string(),
            }));
        }
    }

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Content,
                content: content.to_string(),
            }));
        }
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    Ok(None)
}
