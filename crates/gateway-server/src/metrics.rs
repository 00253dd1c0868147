//! Prometheus metrics recorder and `/metrics` endpoint support.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the process-wide Prometheus recorder. Must be called once at
/// startup, before any metric is recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder().expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Requests admitted and routed, labelled by `provider`/`model`.
pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
/// Requests rejected at admission, labelled by `error_type`.
pub const ADMISSION_ERRORS_TOTAL: &str = "gateway_admission_errors_total";
/// Upstream provider call duration, labelled by `provider`.
pub const UPSTREAM_REQUEST_DURATION_SECONDS: &str = "gateway_upstream_request_duration_seconds";
/// Upstream provider failures, labelled by `provider`, `status`.
pub const UPSTREAM_ERRORS_TOTAL: &str = "gateway_upstream_errors_total";
/// Response cache lookups, labelled by `kind` (one_shot|stream), `hit`.
pub const CACHE_LOOKUPS_TOTAL: &str = "gateway_cache_lookups_total";
/// Logs currently queued awaiting the usage worker.
pub const LOG_QUEUE_DEPTH: &str = "gateway_log_queue_depth";
/// Worker batch-process sweeps, labelled by `outcome` (ok|error).
pub const WORKER_BATCH_SWEEPS_TOTAL: &str = "gateway_worker_batch_sweeps_total";
