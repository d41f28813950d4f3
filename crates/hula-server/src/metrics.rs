//! Metrics collection and export for hula.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "hula_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "hula_connections_active";
    pub const CALLS_TOTAL: &str = "hula_calls_total";
    pub const PAGES_TOTAL: &str = "hula_pages_total";
    pub const RELOADS_TOTAL: &str = "hula_reloads_total";
    pub const RENDER_SECONDS: &str = "hula_render_seconds";
    pub const ERRORS_TOTAL: &str = "hula_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of channel connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open channel connections"
    );
    metrics::describe_counter!(names::CALLS_TOTAL, "Channel calls answered, by outcome");
    metrics::describe_counter!(names::PAGES_TOTAL, "HTTP page renders, by status");
    metrics::describe_counter!(
        names::RELOADS_TOTAL,
        "Reload notices sent to reconnecting clients"
    );
    metrics::describe_histogram!(names::RENDER_SECONDS, "Render latency in seconds");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an answered call.
pub fn record_call(outcome: &'static str) {
    counter!(names::CALLS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a rendered page.
pub fn record_page(status: u16) {
    counter!(names::PAGES_TOTAL, "status" => status.to_string()).increment(1);
}

/// Record a reload notice.
pub fn record_reload() {
    counter!(names::RELOADS_TOTAL).increment(1);
}

/// Record render latency.
pub fn record_render(seconds: f64) {
    histogram!(names::RENDER_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Tracks an open connection; records the disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        let _guard = ConnectionMetricsGuard::new();
        record_call("result");
        record_page(404);
        record_render(0.01);
        record_error("protocol");
    }
}
