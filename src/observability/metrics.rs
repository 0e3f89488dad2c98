use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// Call once, after the recorder is installed and before traffic is served.
pub fn describe_all_metrics() {
    // -- Proxy --
    describe_counter!(
        "fitsaga_proxy_requests_total",
        "Proxy requests by endpoint and outcome"
    );
    describe_histogram!(
        "fitsaga_proxy_request_duration_seconds",
        "Time from request to response headers"
    );
    describe_counter!(
        "fitsaga_proxy_bytes_streamed_total",
        "Body bytes relayed from blob storage to clients"
    );

    // -- Probing --
    describe_counter!(
        "fitsaga_probe_attempts_total",
        "Candidate locations probed, by result"
    );
    describe_histogram!(
        "fitsaga_probe_sweep_length",
        "Locations probed per video request"
    );

    // -- System --
    describe_gauge!("fitsaga_uptime_seconds", "Process uptime");
    describe_counter!(
        "fitsaga_panic_total",
        "Total panics caught (should always be 0)"
    );
    describe_gauge!(
        "fitsaga_shutdown_in_progress",
        "1 if graceful shutdown is in progress, 0 otherwise"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- Proxy --

pub fn inc_proxy_request(endpoint: &'static str, outcome: &'static str) {
    counter!("fitsaga_proxy_requests_total", "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

pub fn record_request_duration(endpoint: &'static str, seconds: f64) {
    histogram!("fitsaga_proxy_request_duration_seconds", "endpoint" => endpoint).record(seconds);
}

pub fn add_bytes_streamed(endpoint: &'static str, bytes: u64) {
    counter!("fitsaga_proxy_bytes_streamed_total", "endpoint" => endpoint).increment(bytes);
}

// -- Probing --

pub fn inc_probe_attempt(result: &'static str) {
    counter!("fitsaga_probe_attempts_total", "result" => result).increment(1);
}

pub fn record_probe_sweep_length(outcome: &'static str, attempts: usize) {
    histogram!("fitsaga_probe_sweep_length", "outcome" => outcome).record(attempts as f64);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("fitsaga_uptime_seconds").set(seconds);
}

pub fn inc_panic_total() {
    counter!("fitsaga_panic_total").increment(1);
}

pub fn set_shutdown_in_progress(in_progress: bool) {
    gauge!("fitsaga_shutdown_in_progress").set(if in_progress { 1.0 } else { 0.0 });
}

// ---------------------------------------------------------------------------
// Outcome label helper
// ---------------------------------------------------------------------------

/// Collapse a response status into the `outcome` label.
pub fn outcome_for_status(status: u16) -> &'static str {
    match status {
        200..=299 => "ok",
        400 => "bad_request",
        404 => "not_found",
        400..=499 => "client_error",
        502 => "upstream_error",
        _ => "server_error",
    }
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Update the uptime gauge every second until cancelled.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the global Prometheus recorder and return the handle `/metrics` renders from.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
