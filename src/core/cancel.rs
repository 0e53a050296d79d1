//! Cooperative cancellation primitives for proxied calls.
//!
//! [`CancelHandle`] aborts the outbound upstream call; [`ResponseSink`] lets
//! whichever path finishes first (normal completion, error, or cancel) write
//! the response to the client exactly once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::{oneshot, watch};

use crate::core::error::{AppError, Result};

/// Handle for aborting an in-flight upstream call.
#[derive(Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signal cancellation. Calling it more than once is harmless.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Get a receiver for use in select!
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.subscribe();
        // The sender outlives `self`, so this only returns once the flag is set.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `future` to completion unless the handle fires first, in which
    /// case the future is dropped and [`AppError::CancelledByClient`] is returned.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AppError::CancelledByClient),
            result = future => result,
        }
    }

    /// Wrap an upstream byte stream so that firing the handle drops it.
    ///
    /// After cancellation the returned stream yields a single
    /// [`AppError::CancelledByClient`] and then ends, which keeps a cancel
    /// distinguishable from both a transport error and a normal end of stream.
    pub fn abortable<S>(&self, upstream: S) -> BoxStream<'static, Result<Bytes>>
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        let handle = self.clone();
        Box::pin(async_stream::stream! {
            let mut upstream = Box::pin(upstream);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = handle.cancelled() => None,
                    item = upstream.next() => Some(item),
                };
                match next {
                    None => {
                        yield Err(AppError::CancelledByClient);
                        break;
                    }
                    Some(Some(item)) => yield item,
                    Some(None) => break,
                }
            }
        })
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-once handle to the client connection of a proxied call.
///
/// The first path to [`claim`](Self::claim) it owns the response; every later
/// attempt is refused.
#[derive(Clone)]
pub struct ResponseSink {
    sent: Arc<AtomicBool>,
    sender: Arc<Mutex<Option<oneshot::Sender<Response>>>>,
}

impl ResponseSink {
    /// Create a sink together with the receiver the handler waits on for a
    /// response completed by another path.
    pub fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (sender, receiver) = oneshot::channel();
        let sink = Self {
            sent: Arc::new(AtomicBool::new(false)),
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        (sink, receiver)
    }

    /// Whether a response has already been claimed.
    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }

    /// Mark the response as sent. Returns `false` if another path got there first.
    pub fn claim(&self) -> bool {
        !self.sent.swap(true, Ordering::SeqCst)
    }

    /// Complete the response from outside the handler. Returns `false` when
    /// a response was already sent.
    pub fn complete(&self, response: Response) -> bool {
        if !self.claim() {
            return false;
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(sender) => sender.send(response).is_ok(),
            None => false,
        }
    }
}
