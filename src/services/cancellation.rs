//! Registry of in-flight requests that a client may cancel by correlation id.
//!
//! Entries are inserted by the provider router before the upstream call and
//! removed exactly once: by an explicit cancel, or by the
//! [`RegistrationGuard`] dropped on every other exit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::response::IntoResponse;
use dashmap::DashMap;

use crate::core::cancel::{CancelHandle, ResponseSink};
use crate::core::error::AppError;
use crate::core::metrics::get_metrics;

/// A request that can currently be cancelled.
pub struct InFlightRequest {
    pub cancel: CancelHandle,
    pub sink: ResponseSink,
    /// Identifies the registration that owns this entry
    token: u64,
}

/// Table of in-flight requests keyed by client-supplied request id.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    entries: Arc<DashMap<String, InFlightRequest>>,
    next_token: Arc<AtomicU64>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request under `request_id`.
    ///
    /// Absent or empty ids are not registered, but a (no-op) guard is still
    /// returned so callers treat both cases alike. An existing entry with the
    /// same id is overwritten.
    pub fn register(
        &self,
        request_id: Option<&str>,
        cancel: CancelHandle,
        sink: ResponseSink,
    ) -> RegistrationGuard {
        let request_id = request_id.filter(|id| !id.is_empty()).map(String::from);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        if let Some(id) = &request_id {
            if self
                .entries
                .insert(id.clone(), InFlightRequest { cancel, sink, token })
                .is_some()
            {
                tracing::warn!(request_id = %id, "Overwrote stale in-flight request entry");
            }
            tracing::debug!(request_id = %id, "Registered in-flight request");
            self.update_gauge();
        }

        RegistrationGuard {
            registry: self.clone(),
            request_id,
            token,
        }
    }

    /// Cancel the request registered under `request_id`.
    ///
    /// Aborts the upstream call and, if the client has not been answered yet,
    /// answers it with a client-cancelled status. Returns `false` without any
    /// side effect when the id is unknown.
    pub fn cancel(&self, request_id: &str) -> bool {
        let Some((_, entry)) = self.entries.remove(request_id) else {
            get_metrics()
                .cancellations
                .with_label_values(&["not_found"])
                .inc();
            return false;
        };
        self.update_gauge();

        entry.cancel.cancel();
        let answered = entry
            .sink
            .complete(AppError::CancelledByClient.into_response());

        get_metrics()
            .cancellations
            .with_label_values(&["cancelled"])
            .inc();
        tracing::info!(
            request_id = %request_id,
            response_completed = answered,
            "Request cancelled by client"
        );
        true
    }

    /// Remove `request_id` from the table. Safe to call for ids that were
    /// never registered or were already removed.
    pub fn release(&self, request_id: &str) {
        if self.entries.remove(request_id).is_some() {
            tracing::debug!(request_id = %request_id, "Released in-flight request");
            self.update_gauge();
        }
    }

    /// Remove `request_id` only while it still belongs to the registration
    /// identified by `token`. A later registration under the same id is
    /// left alone.
    fn release_owned(&self, request_id: &str, token: u64) {
        if self
            .entries
            .remove_if(request_id, |_, entry| entry.token == token)
            .is_some()
        {
            tracing::debug!(request_id = %request_id, "Released in-flight request");
            self.update_gauge();
        }
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update_gauge(&self) {
        get_metrics().in_flight_requests.set(self.entries.len() as i64);
    }
}

/// Releases its registry entry when dropped.
///
/// The guard lives as long as the proxied call: inside the handler for
/// buffered responses, inside the response body for streamed ones.
pub struct RegistrationGuard {
    registry: CancellationRegistry,
    request_id: Option<String>,
    token: u64,
}

impl RegistrationGuard {
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(id) = self.request_id.take() {
            self.registry.release_owned(&id, self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> (CancelHandle, ResponseSink, tokio::sync::oneshot::Receiver<axum::response::Response>) {
        let (sink, receiver) = ResponseSink::channel();
        (CancelHandle::new(), sink, receiver)
    }

    #[test]
    fn test_register_and_release() {
        let registry = CancellationRegistry::new();
        let (cancel, sink, _rx) = entry();

        let guard = registry.register(Some("req-1"), cancel, sink);
        assert_eq!(guard.request_id(), Some("req-1"));
        assert!(registry.contains("req-1"));
        assert_eq!(registry.len(), 1);

        drop(guard);
        assert!(!registry.contains("req-1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_without_id_is_noop() {
        let registry = CancellationRegistry::new();

        let (cancel, sink, _rx) = entry();
        let guard = registry.register(None, cancel, sink);
        assert!(guard.request_id().is_none());

        let (cancel, sink, _rx) = entry();
        let empty = registry.register(Some(""), cancel, sink);
        assert!(empty.request_id().is_none());

        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = CancellationRegistry::new();
        let (cancel, sink, _rx) = entry();
        let _guard = registry.register(Some("req-1"), cancel, sink);

        registry.release("req-1");
        registry.release("req-1");
        registry.release("never-registered");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_overwrites_stale_entry() {
        let registry = CancellationRegistry::new();
        let (first_cancel, first_sink, _rx1) = entry();
        let (second_cancel, second_sink, _rx2) = entry();

        let _g1 = registry.register(Some("dup"), first_cancel.clone(), first_sink);
        let _g2 = registry.register(Some("dup"), second_cancel.clone(), second_sink);
        assert_eq!(registry.len(), 1);

        assert!(registry.cancel("dup"));
        assert!(second_cancel.is_cancelled());
        assert!(!first_cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_fires_handle_and_answers_client() {
        let registry = CancellationRegistry::new();
        let (cancel, sink, receiver) = entry();
        let guard = registry.register(Some("req-1"), cancel.clone(), sink.clone());

        assert!(registry.cancel("req-1"));
        assert!(cancel.is_cancelled());
        assert!(sink.is_sent());
        assert!(!registry.contains("req-1"));

        let response = receiver.await.unwrap();
        assert_eq!(response.status().as_u16(), 499);

        // The guard's later release must not disturb anything.
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_after_response_sent_only_aborts() {
        let registry = CancellationRegistry::new();
        let (cancel, sink, mut receiver) = entry();
        let _guard = registry.register(Some("streaming"), cancel.clone(), sink.clone());

        // Streaming response already handed to the client.
        assert!(sink.claim());

        assert!(registry.cancel("streaming"));
        assert!(cancel.is_cancelled());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_cancel_unknown_id_leaves_others_untouched() {
        let registry = CancellationRegistry::new();
        let (cancel, sink, _rx) = entry();
        let _guard = registry.register(Some("keep-me"), cancel.clone(), sink.clone());

        assert!(!registry.cancel("missing"));
        assert!(registry.contains("keep-me"));
        assert!(!cancel.is_cancelled());
        assert!(!sink.is_sent());
    }

    #[test]
    fn test_old_guard_keeps_reissued_entry() {
        let registry = CancellationRegistry::new();
        let (first_cancel, first_sink, _rx1) = entry();
        let first = registry.register(Some("x"), first_cancel, first_sink);
        assert!(registry.cancel("x"));

        let (second_cancel, second_sink, _rx2) = entry();
        let _second = registry.register(Some("x"), second_cancel.clone(), second_sink);

        drop(first);
        assert!(registry.contains("x"));
        assert!(registry.cancel("x"));
        assert!(second_cancel.is_cancelled());
    }

    #[test]
    fn test_overwritten_guard_does_not_release_newer_entry() {
        let registry = CancellationRegistry::new();
        let (first_cancel, first_sink, _rx1) = entry();
        let (second_cancel, second_sink, _rx2) = entry();

        let first = registry.register(Some("dup"), first_cancel, first_sink);
        let second = registry.register(Some("dup"), second_cancel, second_sink);

        drop(first);
        assert!(registry.contains("dup"));
        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_twice_reports_not_found() {
        let registry = CancellationRegistry::new();
        let (cancel, sink, _rx) = entry();
        let _guard = registry.register(Some("once"), cancel, sink);

        assert!(registry.cancel("once"));
        assert!(!registry.cancel("once"));
    }
}
