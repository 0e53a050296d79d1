//! Services behind the HTTP layer.
//!
//! Route resolution and key management live in [`provider_service`]; the
//! table of cancellable in-flight requests lives in [`cancellation`].

pub mod cancellation;
pub mod provider_service;

pub use cancellation::{CancellationRegistry, RegistrationGuard};
pub use provider_service::{Endpoint, KeySource, ProviderRoute, ProviderService, ProviderSpec};
