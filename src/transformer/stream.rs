//! Streaming utilities for SSE normalization.
//!
//! Upstream chunks arrive with arbitrary boundaries; [`SseLineBuffer`]
//! re-assembles them into complete lines before any parsing happens.

use bytes::Bytes;

/// Prefix of an SSE data line.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Payload of the SSE stream terminator.
pub const SSE_DONE_PAYLOAD: &str = "[DONE]";

// ============================================================================
// Line Buffer
// ============================================================================

/// Carry-over buffer that splits a chunked byte stream into lines.
///
/// A partial final line is kept until a later chunk completes it. Splitting
/// happens on raw bytes, so multi-byte UTF-8 characters cut by a chunk
/// boundary are decoded only once whole.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completes, without the line
    /// terminator (`\n` or `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Take the unterminated remainder left when the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }

    /// Get remaining buffer content.
    pub fn remaining(&self) -> &[u8] {
        &self.buffer
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ============================================================================
// SSE Serializer
// ============================================================================

/// Format a simple data-only SSE event.
pub fn format_sse_data(data: &str) -> String {
    format!("{}{}\n\n", SSE_DATA_PREFIX, data)
}

/// Format the SSE done marker.
pub fn format_sse_done() -> Bytes {
    Bytes::from(format_sse_data(SSE_DONE_PAYLOAD))
}
