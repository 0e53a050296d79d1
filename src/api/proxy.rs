//! Provider call pipeline shared by every chat route.
//!
//! ```text
//! resolve route ─▶ register requestId ─▶ translate ─▶ upstream call
//!                                                        │
//!        client ◀── settle ◀── normalize (stream/JSON) ◀─┘
//! ```
//!
//! A call can be answered by exactly one of two paths: the handler itself,
//! or `/cancel` completing the call's [`ResponseSink`]. Whichever claims the
//! sink first writes the response.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;

use super::disconnect::TrackedStream;
use super::handlers::AppState;
use crate::core::cancel::{CancelHandle, ResponseSink};
use crate::core::error::{AppError, Result};
use crate::core::logging::{generate_request_id, get_provider_context, get_request_id};
use crate::core::metrics::get_metrics;
use crate::services::{ProviderRoute, ProviderSpec, RegistrationGuard};
use crate::transformer::UnifiedChatRequest;
use crate::with_request_context;

/// Body accepted by the chat routes: the unified request plus the custom
/// route's endpoint and key.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    #[serde(flatten)]
    pub request: UnifiedChatRequest,

    #[serde(default, rename = "apiEndpoint")]
    pub api_endpoint: Option<String>,

    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

/// Handle one chat call for `route`.
pub async fn handle_proxy_request(
    state: Arc<AppState>,
    route: ProviderRoute,
    payload: ChatPayload,
) -> Response {
    let request_id = payload
        .request
        .request_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(generate_request_id);

    with_request_context!(request_id, route.name().to_string(), async move {
        proxy(state, route, payload).await
    })
}

async fn proxy(state: Arc<AppState>, route: ProviderRoute, payload: ChatPayload) -> Response {
    let spec = state.provider_service.spec(route);

    let url = match spec.endpoint_url(payload.api_endpoint.as_deref()) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(provider = %route, error = %e, "Rejected provider call");
            return e.into_response();
        }
    };
    let api_key = state
        .provider_service
        .resolve_key(route, payload.api_key.as_deref());
    if api_key.is_none() && !spec.key_sources.is_empty() {
        tracing::warn!(provider = %route, "No API key available, calling upstream without one");
    }

    let cancel = CancelHandle::new();
    let (sink, mut cancelled_response) = ResponseSink::channel();
    let guard = state.registry.register(
        payload.request.request_id.as_deref(),
        cancel.clone(),
        sink.clone(),
    );

    let call = forward(
        &state.http_client,
        spec,
        &url,
        api_key.as_deref(),
        &payload.request,
        &cancel,
        guard,
    );

    let result = tokio::select! {
        biased;
        Ok(response) = &mut cancelled_response => return response,
        result = call => result,
    };

    settle(route, result, &sink, cancelled_response).await
}

/// Translate, call the upstream and normalize its answer.
///
/// `guard` is dropped when this returns, except for a streamed response,
/// whose body takes it over.
async fn forward(
    client: &reqwest::Client,
    spec: &ProviderSpec,
    url: &str,
    api_key: Option<&str>,
    request: &UnifiedChatRequest,
    cancel: &CancelHandle,
    guard: RegistrationGuard,
) -> Result<Response> {
    let adapter = spec.api_type.adapter();
    let translated = adapter.translate_request(request, api_key, &spec.fixed_fields)?;

    tracing::debug!(
        request_id = %get_request_id(),
        provider = %get_provider_context(),
        url = %url,
        api_type = %spec.api_type,
        model = %request.model,
        stream = request.stream,
        "Forwarding request to provider"
    );

    let response = cancel
        .run(async {
            client
                .post(url)
                .headers(translated.headers)
                .json(&translated.body)
                .send()
                .await
                .map_err(AppError::from)
        })
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = match cancel
            .run(async { response.text().await.map_err(AppError::from) })
            .await
        {
            Ok(body) => body,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(_) => String::new(),
        };
        return Err(AppError::UpstreamStatus {
            status: status.as_u16(),
            body,
        });
    }

    if request.stream {
        let upstream_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let content_type = adapter.stream_content_type(upstream_type.as_deref());

        let upstream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| AppError::Stream(e.to_string())));
        let body = TrackedStream::new(adapter.normalize_stream(cancel.abortable(upstream)), guard);

        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(body))
            .map_err(|e| AppError::Internal(e.to_string()));
    }

    let body: Value = cancel
        .run(async { response.json::<Value>().await.map_err(AppError::from) })
        .await?;
    let normalized = adapter.normalize_buffered(body)?;
    drop(guard);

    Ok(Json(normalized).into_response())
}

/// Decide which response the client gets.
async fn settle(
    route: ProviderRoute,
    result: Result<Response>,
    sink: &ResponseSink,
    cancelled_response: oneshot::Receiver<Response>,
) -> Response {
    match result {
        Ok(response) if sink.claim() => response,
        Ok(_) => await_cancelled(cancelled_response).await,
        Err(e) if e.is_cancellation() => await_cancelled(cancelled_response).await,
        Err(e) => {
            tracing::error!(
                request_id = %get_request_id(),
                provider = %route,
                error = %e,
                "Provider call failed"
            );
            get_metrics()
                .upstream_errors
                .with_label_values(&[route.name()])
                .inc();
            if sink.claim() {
                e.into_response()
            } else {
                await_cancelled(cancelled_response).await
            }
        }
    }
}

/// Wait for the response written by the cancel path.
async fn await_cancelled(cancelled_response: oneshot::Receiver<Response>) -> Response {
    cancelled_response
        .await
        .unwrap_or_else(|_| AppError::CancelledByClient.into_response())
}
