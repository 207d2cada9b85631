//! Prometheus metrics exposition and in-process counters
//!
//! Prometheus metrics:
//! - `chat_requests_total` (counter): labels `status`, `mode`
//! - `chat_request_duration_seconds` (histogram): label `status`
//! - `chat_upstream_errors_total` (counter): label `error_type`
//!
//! `GatewayMetrics` holds the plain atomics behind `/health` (requests,
//! errors, in-flight, uptime).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `chat_request_duration_seconds` with explicit histogram buckets
/// so it renders `_bucket` lines for `histogram_quantile()` queries rather
/// than the default summary. Boundaries cover 5ms through 60s, matching the
/// configurable per-candidate timeout range.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "chat_request_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed chat request with status code and mode labels.
pub fn record_request(status: u16, mode: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("chat_requests_total", "status" => status_str.clone(), "mode" => mode.to_string())
        .increment(1);
    metrics::histogram!("chat_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record an upstream-side failure with a classification label.
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("chat_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

/// Runtime counters backing the /health endpoint.
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being processed; drained to 0 before shutdown.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the in-flight counter.
pub struct InFlightGuard(Arc<AtomicU64>);

impl InFlightGuard {
    pub fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
