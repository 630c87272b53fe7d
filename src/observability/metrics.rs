//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route and outcome
//! - `gateway_request_duration_seconds` (histogram): handler latency by route
//! - `gateway_stage_runs_total` (counter): external invocations by stage and outcome
//! - `gateway_stage_duration_seconds` (histogram): invocation latency by stage
//! - `gateway_audit_failures_total` (counter): records that could not be appended

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a handled request.
pub fn record_request(route: &'static str, outcome: &'static str, start_time: Instant) {
    counter!("gateway_requests_total", "route" => route, "outcome" => outcome).increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start_time.elapsed().as_secs_f64());
}

/// Record one external invocation.
pub fn record_stage(stage: &'static str, success: bool, elapsed: Duration) {
    counter!("gateway_stage_runs_total", "stage" => stage, "outcome" => outcome(success)).increment(1);
    histogram!("gateway_stage_duration_seconds", "stage" => stage).record(elapsed.as_secs_f64());
}

/// Record an audit append that failed.
pub fn record_audit_failure() {
    counter!("gateway_audit_failures_total").increment(1);
}
