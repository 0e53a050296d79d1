//! Passthrough adapter for OpenAI-compatible upstreams.
//!
//! OpenAI, Groq, Ollama and custom endpoints already accept the unified
//! request shape and already answer in the client's format, so only auth
//! headers and provider-fixed fields are added; responses are forwarded
//! untouched.

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

use super::{
    insert_header, request_body, ApiType, ByteStream, ProviderAdapter, TranslatedRequest,
    UnifiedChatRequest,
};
use crate::core::error::Result;

const DEFAULT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Adapter for the default (OpenAI-compatible) dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAdapter;

impl ProviderAdapter for PassthroughAdapter {
    fn api_type(&self) -> ApiType {
        ApiType::Default
    }

    fn translate_request(
        &self,
        request: &UnifiedChatRequest,
        api_key: Option<&str>,
        fixed_fields: &Map<String, Value>,
    ) -> Result<TranslatedRequest> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            insert_header(&mut headers, "authorization", &format!("Bearer {}", key))?;
        }

        Ok(TranslatedRequest {
            body: Value::Object(request_body(request, fixed_fields)?),
            headers,
        })
    }

    fn normalize_buffered(&self, body: Value) -> Result<Value> {
        Ok(body)
    }

    fn normalize_stream(&self, upstream: ByteStream) -> ByteStream {
        upstream
    }

    fn stream_content_type(&self, upstream: Option<&str>) -> String {
        upstream
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_STREAM_CONTENT_TYPE)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::Message;
    use bytes::Bytes;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_translate_adds_bearer_token() {
        let request = UnifiedChatRequest::new("gpt-4o", vec![Message::user("Hello")])
            .with_max_tokens(100)
            .with_request_id("abc");

        let translated = PassthroughAdapter
            .translate_request(&request, Some("sk-test"), &Map::new())
            .unwrap();

        assert_eq!(
            translated.headers.get("authorization").unwrap(),
            "Bearer sk-test"
        );
        assert_eq!(
            translated.body,
            json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hello"}],
                "max_tokens": 100,
                "stream": false
            })
        );
    }

    #[test]
    fn test_translate_without_key_omits_authorization() {
        let request = UnifiedChatRequest::new("llama3", vec![Message::user("Hi")]);
        let mut fixed = Map::new();
        fixed.insert("context".to_string(), json!(""));

        let translated = PassthroughAdapter
            .translate_request(&request, None, &fixed)
            .unwrap();

        assert!(translated.headers.get("authorization").is_none());
        assert_eq!(translated.body["context"], "");
    }

    #[test]
    fn test_translate_keeps_system_messages_inline() {
        let request = UnifiedChatRequest::new(
            "gpt-4o",
            vec![Message::system("A"), Message::user("B")],
        );
        let translated = PassthroughAdapter
            .translate_request(&request, Some("k"), &Map::new())
            .unwrap();

        assert!(translated.body.get("system").is_none());
        assert_eq!(translated.body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_normalize_buffered_is_verbatim() {
        let body = json!({"id": "chatcmpl-1", "choices": [{"message": {"content": "hi"}}]});
        assert_eq!(
            PassthroughAdapter.normalize_buffered(body.clone()).unwrap(),
            body
        );
    }

    #[tokio::test]
    async fn test_normalize_stream_forwards_bytes() {
        let chunks = vec![
            Ok(Bytes::from("data: {\"choices\":[]}\n")),
            Ok(Bytes::from("\ndata: [DONE]\n\n")),
        ];
        let upstream: ByteStream = Box::pin(futures::stream::iter(chunks));

        let out: Vec<Bytes> = PassthroughAdapter
            .normalize_stream(upstream)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert_eq!(
            out,
            vec![
                Bytes::from("data: {\"choices\":[]}\n"),
                Bytes::from("\ndata: [DONE]\n\n"),
            ]
        );
    }

    #[test]
    fn test_stream_content_type() {
        assert_eq!(
            PassthroughAdapter.stream_content_type(Some("application/x-ndjson")),
            "application/x-ndjson"
        );
        assert_eq!(
            PassthroughAdapter.stream_content_type(None),
            "text/event-stream"
        );
    }
}
