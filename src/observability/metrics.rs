//! Metrics collection and exposition.
//!
//! # Metrics
//! - `beacon_requests_total` (counter): provider calls by operation, outcome
//! - `beacon_request_duration_seconds` (histogram): provider call latency
//! - `beacon_reconnect_attempts_total` (counter): reconnect actions started
//! - `beacon_reconnections_total` (counter): hand-offs by outcome
//! - `beacon_events_dispatched_total` (counter): published rounds dispatched
//! - `beacon_callback_failures_total` (counter): handler/callback failures
//! - `beacon_pending_callbacks` (gauge): registered request callbacks
//!
//! # Design Decisions
//! - Uses the `metrics` facade; without an installed recorder every call is a no-op
//! - Only the demo binary installs the Prometheus exporter

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(operation: &'static str, outcome: &'static str, started: Instant) {
    counter!("beacon_requests_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("beacon_request_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_reconnect_attempt() {
    counter!("beacon_reconnect_attempts_total").increment(1);
}

pub fn record_reconnection(outcome: &'static str) {
    counter!("beacon_reconnections_total", "outcome" => outcome).increment(1);
}

pub fn record_event_dispatched() {
    counter!("beacon_events_dispatched_total").increment(1);
}

pub fn record_callback_failure() {
    counter!("beacon_callback_failures_total").increment(1);
}

pub fn record_pending_callbacks(count: usize) {
    gauge!("beacon_pending_callbacks").set(count as f64);
}
