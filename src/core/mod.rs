//! Core functionality for the AI proxy server.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling
//! - Cancellation primitives
//! - Logging context
//! - Metrics collection
//! - HTTP middleware

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod middleware;

// Re-export commonly used types
pub use cancel::{CancelHandle, ResponseSink};
pub use config::{AppConfig, ServerConfig, ServerKeys, UpstreamConfig};
pub use error::{AppError, Result};
pub use logging::{generate_request_id, get_provider_context, get_request_id, PROVIDER_CONTEXT, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::MetricsMiddleware;
