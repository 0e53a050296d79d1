//! HTTP middleware for request tracking and metrics.

use crate::core::metrics::get_metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use prometheus::Gauge;
use std::time::Instant;

/// Holds one unit of an active-requests gauge until dropped, so a handler
/// future abandoned mid-flight still gives it back.
struct ActiveGuard(Gauge);

impl ActiveGuard {
    fn new(gauge: Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track metrics for incoming requests.
    ///
    /// This middleware:
    /// - Increments active request counter
    /// - Measures request duration
    /// - Records request count by status code
    ///
    /// For streaming responses the duration is time to response headers,
    /// since the body is still being produced when `next.run()` returns.
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        // Skip metrics endpoint itself to avoid recursion
        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();
        let active = ActiveGuard::new(metrics.active_requests.with_label_values(&[&endpoint]));

        let start = Instant::now();
        let response = next.run(request).await;
        let duration = start.elapsed().as_secs_f64();

        drop(active);

        let status_code = response.status().as_u16().to_string();
        metrics
            .request_count
            .with_label_values(&[&method, &endpoint, &status_code])
            .inc();
        metrics
            .request_duration
            .with_label_values(&[&method, &endpoint])
            .observe(duration);

        tracing::debug!(
            method = %method,
            endpoint = %endpoint,
            status = %status_code,
            duration_ms = (duration * 1000.0) as u64,
            "Request completed"
        );

        response
    }
}
