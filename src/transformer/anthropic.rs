//! Anthropic Messages API adapter.
//!
//! Clients author OpenAI-style message arrays; Anthropic wants the system
//! prompt as a top-level field and streams typed events rather than
//! OpenAI chunks. This adapter bridges both directions.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};

use super::stream::{format_sse_data, format_sse_done, SseLineBuffer, SSE_DATA_PREFIX, SSE_DONE_PAYLOAD};
use super::{
    insert_header, request_body, ApiType, ByteStream, Message, ProviderAdapter, Role,
    TranslatedRequest, UnifiedChatRequest,
};
use crate::core::error::{AppError, Result};
use crate::core::metrics::get_metrics;

/// Anthropic API version sent with every request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Stream event type carrying incremental text.
const CONTENT_BLOCK_DELTA: &str = "content_block_delta";

const PROVIDER_LABEL: &str = "anthropic";

/// Adapter for the Anthropic dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    /// Newline-joined content of all system messages, in order.
    fn system_prompt(messages: &[Message]) -> Option<String> {
        let parts: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Normalize one complete upstream line into a client SSE line, if it
    /// carries text.
    fn normalize_line(line: &str) -> Option<String> {
        let data = line.strip_prefix(SSE_DATA_PREFIX)?;
        if data == SSE_DONE_PAYLOAD {
            return None;
        }

        let payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "Skipping malformed stream fragment");
                get_metrics()
                    .skipped_stream_fragments
                    .with_label_values(&[PROVIDER_LABEL])
                    .inc();
                return None;
            }
        };

        if payload.get("type").and_then(Value::as_str) != Some(CONTENT_BLOCK_DELTA) {
            return None;
        }
        let text = payload
            .get("delta")
            .and_then(|delta| delta.get("text"))
            .and_then(Value::as_str)?;

        let delta = json!({ "choices": [{ "delta": { "content": text } }] });
        Some(format_sse_data(&delta.to_string()))
    }

    fn normalize_lines(lines: impl IntoIterator<Item = String>) -> String {
        lines
            .into_iter()
            .filter_map(|line| Self::normalize_line(&line))
            .collect()
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn api_type(&self) -> ApiType {
        ApiType::Anthropic
    }

    fn translate_request(
        &self,
        request: &UnifiedChatRequest,
        api_key: Option<&str>,
        fixed_fields: &Map<String, Value>,
    ) -> Result<TranslatedRequest> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            insert_header(&mut headers, "x-api-key", key)?;
        }
        insert_header(&mut headers, "anthropic-version", ANTHROPIC_VERSION)?;

        let mut body = request_body(request, fixed_fields)?;
        if let Some(system) = Self::system_prompt(&request.messages) {
            body.insert("system".to_string(), Value::String(system));
        }
        let messages: Vec<&Message> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        body.insert("messages".to_string(), serde_json::to_value(messages)?);

        Ok(TranslatedRequest {
            body: Value::Object(body),
            headers,
        })
    }

    fn normalize_buffered(&self, body: Value) -> Result<Value> {
        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::InvalidUpstreamResponse("missing content blocks".to_string())
            })?;

        let text: String = blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();

        Ok(json!({ "choices": [{ "message": { "content": text.trim() } }] }))
    }

    fn normalize_stream(&self, upstream: ByteStream) -> ByteStream {
        Box::pin(async_stream::stream! {
            let mut upstream = upstream;
            let mut lines = SseLineBuffer::new();

            while let Some(chunk) = upstream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let out = Self::normalize_lines(lines.push(&chunk));
                if !out.is_empty() {
                    yield Ok(Bytes::from(out));
                }
            }

            let tail = Self::normalize_lines(lines.finish());
            if !tail.is_empty() {
                yield Ok(Bytes::from(tail));
            }
            yield Ok(format_sse_done());
        })
    }

    fn stream_content_type(&self, _upstream: Option<&str>) -> String {
        "text/event-stream".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn delta_event(text: &str) -> String {
        format!(
            "event: content_block_delta\ndata: {}\n\n",
            json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": text}
            })
        )
    }

    async fn collect(chunks: Vec<Result<Bytes>>) -> (String, Option<AppError>) {
        let upstream: ByteStream = Box::pin(futures::stream::iter(chunks));
        let mut stream = AnthropicAdapter.normalize_stream(upstream);
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => out.push_str(std::str::from_utf8(&bytes).unwrap()),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[test]
    fn test_translate_extracts_system() {
        let request = UnifiedChatRequest::new(
            "claude-3-5-sonnet",
            vec![Message::system("A"), Message::user("B")],
        );

        let translated = AnthropicAdapter
            .translate_request(&request, Some("sk-ant"), &Map::new())
            .unwrap();

        assert_eq!(translated.body["system"], "A");
        assert_eq!(
            translated.body["messages"],
            json!([{"role": "user", "content": "B"}])
        );
        assert_eq!(translated.headers.get("x-api-key").unwrap(), "sk-ant");
        assert_eq!(
            translated.headers.get("anthropic-version").unwrap(),
            ANTHROPIC_VERSION
        );
        assert!(translated.headers.get("authorization").is_none());
    }

    #[test]
    fn test_translate_joins_multiple_system_messages_in_order() {
        let request = UnifiedChatRequest::new(
            "claude-3-haiku",
            vec![
                Message::system("first"),
                Message::user("q1"),
                Message::assistant("a1"),
                Message::system("second"),
                Message::user("q2"),
            ],
        )
        .with_max_tokens(512)
        .with_stream(true);

        let translated = AnthropicAdapter
            .translate_request(&request, Some("k"), &Map::new())
            .unwrap();

        assert_eq!(translated.body["system"], "first\nsecond");
        assert_eq!(
            translated.body["messages"],
            json!([
                {"role": "user", "content": "q1"},
                {"role": "assistant", "content": "a1"},
                {"role": "user", "content": "q2"}
            ])
        );
        assert_eq!(translated.body["max_tokens"], 512);
        assert_eq!(translated.body["stream"], true);
    }

    #[test]
    fn test_translate_without_system_omits_field() {
        let request = UnifiedChatRequest::new("claude-3-haiku", vec![Message::user("Hi")]);
        let translated = AnthropicAdapter
            .translate_request(&request, Some("k"), &Map::new())
            .unwrap();
        assert!(translated.body.get("system").is_none());
    }

    #[test]
    fn test_normalize_buffered_concatenates_and_trims() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "content": [{"type": "text", "text": "Hello "}, {"type": "text", "text": "world"}]
        });
        assert_eq!(
            AnthropicAdapter.normalize_buffered(body).unwrap(),
            json!({"choices": [{"message": {"content": "Hello world"}}]})
        );
    }

    #[test]
    fn test_normalize_buffered_trims_outer_whitespace() {
        let body = json!({"content": [{"text": "\n  spaced  "}, {"type": "tool_use", "id": "t1"}]});
        assert_eq!(
            AnthropicAdapter.normalize_buffered(body).unwrap(),
            json!({"choices": [{"message": {"content": "spaced"}}]})
        );
    }

    #[test]
    fn test_normalize_buffered_requires_content() {
        let result = AnthropicAdapter.normalize_buffered(json!({"type": "error"}));
        assert!(matches!(result, Err(AppError::InvalidUpstreamResponse(_))));
    }

    #[tokio::test]
    async fn test_stream_emits_deltas_and_done() {
        let upstream = format!(
            "event: message_start\ndata: {}\n\n{}{}event: message_stop\ndata: {}\n\n",
            json!({"type": "message_start", "message": {"id": "msg_1"}}),
            delta_event("Hel"),
            delta_event("lo"),
            json!({"type": "message_stop"}),
        );

        let (out, err) = collect(vec![Ok(Bytes::from(upstream))]).await;
        assert!(err.is_none());
        assert_eq!(
            out,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
             data: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_stream_reassembles_event_split_across_chunks() {
        let event = delta_event("split me");
        for cut in 1..event.len() {
            let (first, second) = event.split_at(cut);
            let (out, _) = collect(vec![
                Ok(Bytes::copy_from_slice(first.as_bytes())),
                Ok(Bytes::copy_from_slice(second.as_bytes())),
            ])
            .await;

            assert_eq!(
                out,
                "data: {\"choices\":[{\"delta\":{\"content\":\"split me\"}}]}\n\ndata: [DONE]\n\n",
                "cut at {}",
                cut
            );
        }
    }

    #[tokio::test]
    async fn test_stream_skips_malformed_line() {
        let upstream = format!(
            "{}data: {{not json\n\n{}",
            delta_event("before"),
            delta_event("after")
        );

        let (out, err) = collect(vec![Ok(Bytes::from(upstream))]).await;
        assert!(err.is_none());
        assert!(out.contains("\"content\":\"before\""));
        assert!(out.contains("\"content\":\"after\""));
        assert!(out.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_stream_ignores_done_sentinel_and_other_events() {
        let upstream = format!(
            "data: [DONE]\n\ndata: {}\n\n: comment\n\n",
            json!({"type": "ping"})
        );
        let (out, _) = collect(vec![Ok(Bytes::from(upstream))]).await;
        assert_eq!(out, "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_stream_ignores_non_text_delta() {
        let upstream = format!(
            "data: {}\n\n",
            json!({
                "type": "content_block_delta",
                "delta": {"type": "input_json_delta", "partial_json": "{\"a\""}
            })
        );
        let (out, _) = collect(vec![Ok(Bytes::from(upstream))]).await;
        assert_eq!(out, "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_stream_processes_unterminated_tail() {
        let tail = format!(
            "data: {}",
            json!({"type": "content_block_delta", "delta": {"text": "tail"}})
        );
        let (out, _) = collect(vec![Ok(Bytes::from(tail))]).await;
        assert_eq!(
            out,
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_stream_error_propagates_without_done() {
        let (out, err) = collect(vec![
            Ok(Bytes::from(delta_event("partial"))),
            Err(AppError::Stream("connection reset".to_string())),
            Ok(Bytes::from(delta_event("never"))),
        ])
        .await;

        assert!(matches!(err, Some(AppError::Stream(_))));
        assert!(out.contains("partial"));
        assert!(!out.contains("never"));
        assert!(!out.contains("[DONE]"));
    }

    #[tokio::test]
    async fn test_stream_escapes_fragment_text() {
        let (out, _) = collect(vec![Ok(Bytes::from(delta_event("say \"hi\"\n")))]).await;
        let first_line = out.lines().next().unwrap();
        let payload: Value =
            serde_json::from_str(first_line.strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(payload["choices"][0]["delta"]["content"], "say \"hi\"\n");
    }
}
