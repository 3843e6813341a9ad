//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, breaker activity, bridge traffic)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): operations requests by outcome
//! - `gateway_request_duration_seconds` (histogram): operations latency
//! - `gateway_downstream_errors_total` (counter): downstream failures by kind
//! - `gateway_breaker_calls_total` (counter): breaker dispatches by result
//! - `gateway_breaker_transitions_total` (counter): transitions by target state
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_bridge_sessions` (gauge): connected bridge sessions
//! - `gateway_bridge_frames_total` (counter): bridge frames by direction and result
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels stay low-cardinality: outcome, kind, state, never addresses

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

/// Record a completed operations request.
pub fn record_request(outcome: &'static str, start: Instant) {
    metrics::counter!("gateway_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record a failed downstream call.
pub fn record_downstream_error(kind: &'static str) {
    metrics::counter!("gateway_downstream_errors_total", "kind" => kind).increment(1);
}

/// Record one breaker dispatch.
pub fn record_breaker_call(breaker: &str, result: &'static str) {
    metrics::counter!(
        "gateway_breaker_calls_total",
        "breaker" => breaker.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record a breaker state transition.
pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    let (label, value) = match to {
        CircuitState::Closed => ("closed", 0.0),
        CircuitState::Open => ("open", 1.0),
        CircuitState::HalfOpen => ("half_open", 2.0),
    };
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => label
    )
    .increment(1);
    metrics::gauge!("gateway_breaker_state", "breaker" => breaker.to_string()).set(value);
}

/// Record the current bridge session count.
pub fn record_bridge_sessions(count: usize) {
    metrics::gauge!("gateway_bridge_sessions").set(count as f64);
}

/// Record a bridge frame.
pub fn record_bridge_frame(direction: &'static str, result: &'static str) {
    metrics::counter!(
        "gateway_bridge_frames_total",
        "direction" => direction,
        "result" => result
    )
    .increment(1);
}
