//! Prometheus metrics for the authentication server.
//!
//! Counters and gauges are exported on a separate scrape endpoint; the
//! exporter is optional and the recording calls are no-ops until it is
//! installed.

#![allow(dead_code)] // Public API for future integration

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter; metrics become scrapeable at
/// `http://<addr>/metrics`
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Record HTTP request with method, path, and status labels
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment completed registrations
pub fn registrations_total() {
    metrics::counter!("registrations_total").increment(1);
}

/// Increment login attempts, labeled by outcome
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment one-time codes issued, labeled by purpose
pub fn otp_issued_total(purpose: &str) {
    metrics::counter!("otp_issued_total",
        "purpose" => purpose.to_string()
    )
    .increment(1);
}

/// Increment completed password resets
pub fn password_resets_total() {
    metrics::counter!("password_resets_total").increment(1);
}

/// Increment rate limit hits, labeled by endpoint family
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

/// Set current count of staged (unconfirmed) registrations
pub fn pending_registrations(count: usize) {
    metrics::gauge!("pending_registrations").set(count as f64);
}

/// Set current database connection pool size
pub fn db_connections_active(count: u32) {
    metrics::gauge!("db_connections_active").set(count as f64);
}
