//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (request count, latency)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by method, status, route
//! - `router_request_duration_seconds` (histogram): latency by method, route
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - The route label is the matched pattern, never the raw path, to keep
//!   label cardinality bounded
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use thiserror::Error;

pub const REQUESTS_TOTAL: &str = "router_requests_total";
pub const REQUEST_DURATION: &str = "router_request_duration_seconds";

/// Route label used when no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Errors from installing the exporter.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),

    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter, serving `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    builder
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total requests dispatched");
    describe_histogram!(REQUEST_DURATION, "Time from dispatch to reply");
}

/// Record one dispatched request.
pub fn record_request(method: &str, status: u16, route: &str, elapsed: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_exporter_is_noop() {
        record_request("GET", 200, "/users/:id", Duration::from_millis(3));
        record_request("POST", 404, UNMATCHED_ROUTE, Duration::ZERO);
    }
}
