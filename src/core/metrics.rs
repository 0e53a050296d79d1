//! Prometheus metrics for monitoring the AI proxy server.
//!
//! This module provides a centralized metrics registry for tracking requests,
//! latency, cancellations and stream normalization health.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    GaugeVec, HistogramVec, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds (time to response headers)
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Requests currently registered for cancellation
    pub in_flight_requests: IntGauge,

    /// Cancel calls by outcome (`cancelled`, `not_found`)
    pub cancellations: IntCounterVec,

    /// Failed upstream calls by provider
    pub upstream_errors: IntCounterVec,

    /// Upstream stream lines dropped because they were not valid JSON
    pub skipped_stream_fragments: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call more than once; every call returns the same instance.
///
/// # Examples
///
/// ```no_run
/// use ai_proxy_rust::core::metrics::init_metrics;
///
/// let metrics = init_metrics();
/// metrics.request_count.with_label_values(&["GET", "/check", "200"]).inc();
/// ```
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "ai_proxy_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "ai_proxy_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "ai_proxy_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let in_flight_requests = register_int_gauge!(
            "ai_proxy_in_flight_requests",
            "Requests currently registered for cancellation"
        )
        .expect("Failed to register in_flight_requests metric");

        let cancellations = register_int_counter_vec!(
            "ai_proxy_cancellations_total",
            "Cancel calls by outcome",
            &["outcome"]
        )
        .expect("Failed to register cancellations metric");

        let upstream_errors = register_int_counter_vec!(
            "ai_proxy_upstream_errors_total",
            "Failed upstream calls by provider",
            &["provider"]
        )
        .expect("Failed to register upstream_errors metric");

        let skipped_stream_fragments = register_int_counter_vec!(
            "ai_proxy_skipped_stream_fragments_total",
            "Upstream stream lines skipped because they failed to parse",
            &["provider"]
        )
        .expect("Failed to register skipped_stream_fragments metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            in_flight_requests,
            cancellations,
            upstream_errors,
            skipped_stream_fragments,
        }
    })
}

/// Get the global metrics instance, initializing it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
