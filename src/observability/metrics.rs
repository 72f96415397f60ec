//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_rejections_total` (counter): gate rejections by kind, reason
//! - `gateway_rate_limited_total` (counter): 429s by class
//! - `gateway_rate_limit_store_errors_total` (counter): fail-open events by store
//! - `gateway_jwks_refresh_total` (counter): key set refreshes by outcome
//! - `gateway_upstream_in_flight` (gauge): forwarded calls by target
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder (tests, CLI) every call is a no-op
//! - Labels are bounded: route names, classes and targets come from config

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics listener started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(kind: &'static str, reason: &'static str) {
    metrics::counter!("gateway_rejections_total", "kind" => kind, "reason" => reason).increment(1);
}

pub fn record_rate_limited(class: &str) {
    metrics::counter!("gateway_rate_limited_total", "class" => class.to_string()).increment(1);
}

pub fn record_store_error(store: &'static str) {
    metrics::counter!("gateway_rate_limit_store_errors_total", "store" => store).increment(1);
}

pub fn record_jwks_refresh(outcome: &'static str) {
    metrics::counter!("gateway_jwks_refresh_total", "outcome" => outcome).increment(1);
}

pub fn set_upstream_in_flight(target: &str, in_flight: usize) {
    metrics::gauge!("gateway_upstream_in_flight", "target" => target.to_string()).set(in_flight as f64);
}
