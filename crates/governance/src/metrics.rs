//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use code_runner_core::{Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Count an accepted submission.
pub fn track_submission(mode: &str) {
    metrics::counter!("code_runner_submissions_total", "mode" => mode.to_string()).increment(1);
}

/// Record a finished execution (terminal status and wall-clock seconds).
pub fn track_execution(mode: &str, status: &str, duration_sec: f64) {
    metrics::counter!(
        "code_runner_executions_total",
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "code_runner_execution_duration_seconds",
        "mode" => mode.to_string()
    )
    .record(duration_sec);
}

/// Count a sandbox cleanup step that failed and was suppressed.
pub fn track_cleanup_failure(resource: &str) {
    metrics::counter!("code_runner_cleanup_failures_total", "resource" => resource.to_string())
        .increment(1);
}

/// Helper to track HTTP request metrics (latency, count).
pub fn track_request(method: &str, path: &str, status: u16, latency_sec: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(latency_sec);
}
