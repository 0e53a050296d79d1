//! API layer for the AI proxy server.
//!
//! This module contains the HTTP handlers, the shared provider call
//! pipeline and the router that wires them to their routes.

pub mod disconnect;
pub mod handlers;
pub mod proxy;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::core::MetricsMiddleware;

// Re-export commonly used types
pub use disconnect::TrackedStream;
pub use handlers::{
    anthropic, cancel_request, capture_api_keys, check, custom, groq, metrics_handler,
    ollama_chat, openai, AppState,
};
pub use proxy::{handle_proxy_request, ChatPayload};

/// Largest request body accepted on any route.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Build the router with all endpoints and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    let proxy_routes = Router::new()
        .route("/api-keys", post(capture_api_keys))
        .route("/openai", post(openai))
        .route("/groq", post(groq))
        .route("/anthropic", post(anthropic))
        .route("/ollama/chat", post(ollama_chat))
        .route("/custom", post(custom))
        .route("/cancel", post(cancel_request))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .with_state(state);

    Router::new()
        .merge(proxy_routes)
        .route("/check", get(check))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
