//! Transformer module for provider protocol conversion.
//!
//! Every upstream speaks one of two wire dialects, captured by [`ApiType`].
//! Each dialect has one [`ProviderAdapter`] implementation that knows how to
//!
//! 1. `translate_request`: turn a [`UnifiedChatRequest`] into the provider's
//!    body and auth headers
//! 2. `normalize_buffered`: turn a buffered provider response into the
//!    client-facing JSON
//! 3. `normalize_stream`: turn a provider byte stream into the client-facing
//!    SSE stream
//!
//! ```text
//! Client Request ─▶ [translate_request] ─▶ Provider
//!                                              │
//! Client Response ◀─ [normalize_*] ◀───────────┘
//! ```
//!
//! Adding a dialect means adding a variant and one adapter.

pub mod anthropic;
pub mod passthrough;
pub mod stream;
pub mod unified;

use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub use anthropic::AnthropicAdapter;
pub use passthrough::PassthroughAdapter;
pub use stream::SseLineBuffer;
pub use unified::{Message, Role, UnifiedChatRequest};

use crate::core::error::{AppError, Result};

/// Lazy, finite byte stream flowing from an upstream to the client.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Wire dialect spoken by an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// OpenAI-compatible chat completions (OpenAI, Groq, Ollama, custom)
    Default,
    /// Anthropic messages API
    Anthropic,
}

impl ApiType {
    /// The adapter implementing this dialect.
    pub fn adapter(self) -> &'static dyn ProviderAdapter {
        static PASSTHROUGH: PassthroughAdapter = PassthroughAdapter;
        static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;

        match self {
            ApiType::Default => &PASSTHROUGH,
            ApiType::Anthropic => &ANTHROPIC,
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiType::Default => write!(f, "default"),
            ApiType::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// A provider-specific wire request.
#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub body: Value,
    pub headers: HeaderMap,
}

/// Provider dialect conversion.
pub trait ProviderAdapter: Send + Sync {
    /// Get the dialect this adapter handles.
    fn api_type(&self) -> ApiType;

    /// Build the upstream body and auth headers.
    ///
    /// `fixed_fields` are provider-mandated body fields merged in last.
    fn translate_request(
        &self,
        request: &UnifiedChatRequest,
        api_key: Option<&str>,
        fixed_fields: &Map<String, Value>,
    ) -> Result<TranslatedRequest>;

    /// Convert a buffered upstream JSON body into the client response body.
    fn normalize_buffered(&self, body: Value) -> Result<Value>;

    /// Convert an upstream byte stream into the client byte stream.
    ///
    /// Errors from `upstream` are passed through and end the stream.
    fn normalize_stream(&self, upstream: ByteStream) -> ByteStream;

    /// Content type of the normalized stream, given the upstream's.
    fn stream_content_type(&self, upstream: Option<&str>) -> String;
}

/// Translate `request` for `api_type`.
pub fn translate(
    api_type: ApiType,
    request: &UnifiedChatRequest,
    api_key: Option<&str>,
    fixed_fields: &Map<String, Value>,
) -> Result<TranslatedRequest> {
    api_type
        .adapter()
        .translate_request(request, api_key, fixed_fields)
}

/// Serialize `request` and merge provider-fixed fields into it.
pub(crate) fn request_body(
    request: &UnifiedChatRequest,
    fixed_fields: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut body = match serde_json::to_value(request)? {
        Value::Object(map) => map,
        other => {
            return Err(AppError::Internal(format!(
                "Chat request serialized to non-object: {}",
                other
            )))
        }
    };
    for (key, value) in fixed_fields {
        body.insert(key.clone(), value.clone());
    }
    Ok(body)
}

/// Insert a header whose value comes from client-controlled input.
pub(crate) fn insert_header(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| AppError::BadRequest(format!("Invalid value for header {}", name)))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adapter_dispatch() {
        assert_eq!(ApiType::Default.adapter().api_type(), ApiType::Default);
        assert_eq!(ApiType::Anthropic.adapter().api_type(), ApiType::Anthropic);
    }

    #[test]
    fn test_api_type_display() {
        assert_eq!(ApiType::Default.to_string(), "default");
        assert_eq!(ApiType::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn test_request_body_merges_fixed_fields() {
        let request = UnifiedChatRequest::new("llama3", vec![Message::user("Hi")]);
        let mut fixed = Map::new();
        fixed.insert("context".to_string(), json!(""));

        let body = request_body(&request, &fixed).unwrap();
        assert_eq!(body["context"], "");
        assert_eq!(body["model"], "llama3");
    }

    #[test]
    fn test_insert_header_rejects_invalid_value() {
        let mut headers = HeaderMap::new();
        let result = insert_header(&mut headers, "x-api-key", "bad\nkey");
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(headers.is_empty());
    }
}
