//! HTTP request handlers for the proxy endpoints.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;

use super::proxy::{handle_proxy_request, ChatPayload};
use crate::core::config::AppConfig;
use crate::core::error::{AppError, Result};
use crate::services::{CancellationRegistry, ProviderRoute, ProviderService};

/// Application state shared across all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub provider_service: ProviderService,
    pub registry: CancellationRegistry,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig, http_client: reqwest::Client) -> Self {
        let provider_service = ProviderService::new(&config.upstream, config.keys.clone());
        Self {
            config,
            provider_service,
            registry: CancellationRegistry::new(),
            http_client,
        }
    }
}

/// Keys a client may hand over once.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeysPayload {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelPayload {
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
}

/// `Json` extractor whose rejections render as [`AppError`] bodies.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Liveness check.
pub async fn check() -> StatusCode {
    StatusCode::OK
}

/// Capture client API keys for providers that have none yet.
pub async fn capture_api_keys(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ApiKeysPayload>,
) -> StatusCode {
    let offered = [
        (ProviderRoute::OpenAI, payload.openai_api_key),
        (ProviderRoute::Groq, payload.groq_api_key),
        (ProviderRoute::Anthropic, payload.anthropic_api_key),
    ];
    for (route, key) in offered {
        if let Some(key) = key {
            state.provider_service.capture_key(route, &key);
        }
    }
    StatusCode::OK
}

pub async fn openai(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Response {
    handle_proxy_request(state, ProviderRoute::OpenAI, payload).await
}

pub async fn groq(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Response {
    handle_proxy_request(state, ProviderRoute::Groq, payload).await
}

pub async fn anthropic(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Response {
    handle_proxy_request(state, ProviderRoute::Anthropic, payload).await
}

pub async fn ollama_chat(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Response {
    handle_proxy_request(state, ProviderRoute::Ollama, payload).await
}

/// Proxy to the endpoint named by the request's `apiEndpoint`.
pub async fn custom(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Response {
    handle_proxy_request(state, ProviderRoute::Custom, payload).await
}

/// Cancel an in-flight request by its client-supplied id.
#[tracing::instrument(skip_all)]
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<CancelPayload>,
) -> Result<Response> {
    let request_id = payload.request_id.unwrap_or_default();
    if request_id.is_empty() || !state.registry.cancel(&request_id) {
        return Err(AppError::UnknownRequestId(request_id));
    }
    Ok(Json(json!({ "message": "Request cancelled successfully" })).into_response())
}

/// Prometheus metrics endpoint.
#[tracing::instrument]
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(buffer.into())
        .map_err(|e| AppError::Internal(e.to_string()))
}
