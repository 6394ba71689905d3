//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registry_requests_total` (counter): requests by method, matched path, status
//! - `registry_request_duration_seconds` (histogram): latency distribution
//! - `registry_cache_events_total` (counter): cache outcomes by cache name
//! - `registry_resolutions_total` (counter): route resolution outcomes
//! - `registry_versions_written_total` (counter): version records by entity type
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   every call is a no-op, so tests need no setup
//! - Path label uses the matched route template, never the raw URI

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, path: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("registry_requests_total", &labels).increment(1);
    metrics::histogram!("registry_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// `outcome` is one of `fresh`, `stale`, `miss`, `refresh_error`.
pub fn record_cache_event(cache: &str, outcome: &'static str) {
    metrics::counter!(
        "registry_cache_events_total",
        "cache" => cache.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// `outcome` is one of `matched`, `special`, `no_match`.
pub fn record_resolution(outcome: &'static str) {
    metrics::counter!("registry_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_version_written(entity_type: &str) {
    metrics::counter!(
        "registry_versions_written_total",
        "entity_type" => entity_type.to_string()
    )
    .increment(1);
}

/// Axum middleware recording count and latency for every request.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    record_request(&method, response.status().as_u16(), &path, start);
    response
}
