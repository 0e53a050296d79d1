//! AI Proxy - a local proxy in front of chat-completion providers
//!
//! Clients send one OpenAI-style chat request shape to a per-provider route;
//! the proxy injects credentials, translates the request into the provider's
//! dialect, streams or buffers the answer back in a normalized form, and lets
//! the client cancel any in-flight call by its `requestId`.
//!
//! - **Request translation**: OpenAI-compatible passthrough and the Anthropic
//!   Messages API
//! - **Stream normalization**: Anthropic SSE events re-emitted as OpenAI-style
//!   deltas, chunk boundaries handled transparently
//! - **Cancellation**: per-request registry with write-once response handoff
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! - [`core`]: config, errors, cancellation primitives, logging context,
//!   metrics, middleware
//! - [`transformer`]: provider dialects and SSE stream handling
//! - [`services`]: provider route table, key store, cancellation registry
//! - [`api`]: HTTP handlers, the provider call pipeline and the router
//!
//! # Configuration
//!
//! All settings are optional environment variables:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 7070)
//! - `CORS_ORIGINS`: Comma-separated allowed origins (default: http://localhost:8080)
//! - `VERIFY_SSL`: Verify SSL certificates for upstream (default: true)
//! - `UPSTREAM_TIMEOUT_SECS`: Upstream request timeout (default: none)
//! - `OPENAI_API_KEY`, `GROQ_API_KEY`, `ANTHROPIC_API_KEY`, `CUSTOM_API_KEY`
//! - `OPENAI_API_URL`, `GROQ_API_URL`, `ANTHROPIC_API_URL`, `OLLAMA_BASE_URL`

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{router, AppState, ChatPayload};
pub use core::{AppConfig, AppError, Result};
pub use services::{CancellationRegistry, ProviderRoute, ProviderService};
pub use transformer::{ApiType, Message, Role, UnifiedChatRequest};
