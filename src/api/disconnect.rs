use crate::core::error::{AppError, Result};
use crate::services::RegistrationGuard;
use crate::transformer::ByteStream;
use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body stream that owns the call's registry entry.
///
/// The entry is released when the stream finishes or when the body is
/// dropped, which is how a client disconnect shows up. A cancellation
/// ends the stream without an error so the connection closes cleanly.
pub struct TrackedStream {
    stream: ByteStream,
    guard: Option<RegistrationGuard>,
    finished: bool,
}

impl TrackedStream {
    pub fn new(stream: ByteStream, guard: RegistrationGuard) -> Self {
        Self {
            stream,
            guard: Some(guard),
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.guard.take();
    }
}

impl Stream for TrackedStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.stream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(AppError::CancelledByClient))) => {
                tracing::info!("Stream cancelled by client");
                self.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(error = %e, "Upstream stream failed");
                self.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        if !self.finished {
            let request_id = self
                .guard
                .as_ref()
                .and_then(|guard| guard.request_id())
                .unwrap_or("-");
            tracing::debug!(request_id = %request_id, "Client disconnect detected - stream dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::{CancelHandle, ResponseSink};
    use crate::services::CancellationRegistry;
    use futures::StreamExt;

    fn tracked(
        chunks: Vec<Result<Bytes>>,
        registry: &CancellationRegistry,
        id: &str,
    ) -> TrackedStream {
        let (sink, _rx) = ResponseSink::channel();
        let guard = registry.register(Some(id), CancelHandle::new(), sink);
        TrackedStream::new(Box::pin(futures::stream::iter(chunks)), guard)
    }

    #[tokio::test]
    async fn test_release_on_completion() {
        let registry = CancellationRegistry::new();
        let mut stream = tracked(vec![Ok(Bytes::from("a"))], &registry, "done");
        assert!(registry.contains("done"));

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("a"));
        assert!(registry.contains("done"));
        assert!(stream.next().await.is_none());
        assert!(!registry.contains("done"));
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let registry = CancellationRegistry::new();
        let stream = tracked(vec![Ok(Bytes::from("a"))], &registry, "dropped");
        assert!(registry.contains("dropped"));
        drop(stream);
        assert!(!registry.contains("dropped"));
    }

    #[tokio::test]
    async fn test_cancellation_ends_cleanly() {
        let registry = CancellationRegistry::new();
        let mut stream = tracked(
            vec![
                Ok(Bytes::from("a")),
                Err(AppError::CancelledByClient),
                Ok(Bytes::from("never")),
            ],
            &registry,
            "cancelled",
        );

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_propagates_then_ends() {
        let registry = CancellationRegistry::new();
        let mut stream = tracked(
            vec![Err(AppError::Stream("reset".to_string())), Ok(Bytes::from("x"))],
            &registry,
            "failed",
        );

        assert!(matches!(stream.next().await, Some(Err(AppError::Stream(_)))));
        assert!(stream.next().await.is_none());
        assert!(registry.is_empty());
    }
}
