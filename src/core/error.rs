//! Error types and handling for the AI proxy server.
//!
//! This module provides a unified error type [`AppError`] that wraps the
//! failure sources of a proxied call and converts them into the flat
//! `{"error": "..."}` bodies the client expects.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Non-standard status used when the client cancels an in-flight request.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

pub const MESSAGE_UPSTREAM_FAILURE: &str = "Failed to call API";
pub const MESSAGE_CANCELLED: &str = "Request canceled by the client";
pub const MESSAGE_NOT_FOUND: &str = "Request not found";

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Network or HTTP status failure talking to a provider
    #[error("Upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Provider answered 2xx with a body that cannot be normalized
    #[error("Invalid upstream response: {0}")]
    InvalidUpstreamResponse(String),

    /// Transport failure while reading an upstream response stream
    #[error("Upstream stream error: {0}")]
    Stream(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The call's cancellation handle fired
    #[error("Request cancelled by client")]
    CancelledByClient,

    /// Cancel call for a request id that is not in flight
    #[error("Unknown request id: {0}")]
    UnknownRequestId(String),

    /// Client provided invalid data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error was caused by an explicit client cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::CancelledByClient)
    }

    /// HTTP status used when this error is rendered.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::CancelledByClient => StatusCode::from_u16(STATUS_CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::REQUEST_TIMEOUT),
            AppError::UnknownRequestId(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Upstream(_)
            | AppError::UpstreamStatus { .. }
            | AppError::InvalidUpstreamResponse(_)
            | AppError::Stream(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Upstream details stay in the logs; the client only sees an opaque message.
        let message = match self {
            AppError::Upstream(_)
            | AppError::UpstreamStatus { .. }
            | AppError::InvalidUpstreamResponse(_)
            | AppError::Stream(_) => MESSAGE_UPSTREAM_FAILURE.to_string(),
            AppError::CancelledByClient => MESSAGE_CANCELLED.to_string(),
            AppError::UnknownRequestId(_) => MESSAGE_NOT_FOUND.to_string(),
            AppError::BadRequest(msg) => msg,
            AppError::Config(e) => e.to_string(),
            AppError::Serialization(e) => e.to_string(),
            AppError::Internal(msg) => msg,
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
