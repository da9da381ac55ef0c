//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, branch
//! - `proxy_request_duration_seconds` (histogram): time to response head
//! - `proxy_attribute_rewrite_failures_total` (counter): attributes left untouched
//! - `proxy_upstream_errors_total` (counter): failed upstream fetches
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - Prometheus exporter serves its own listener, separate from proxy traffic

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, branch: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "branch" => branch
    )
    .increment(1);

    metrics::histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "branch" => branch
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rewrite_failure() {
    metrics::counter!("proxy_attribute_rewrite_failures_total").increment(1);
}

pub fn record_upstream_error() {
    metrics::counter!("proxy_upstream_errors_total").increment(1);
}
