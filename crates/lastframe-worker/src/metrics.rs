//! Prometheus metrics for the pipeline.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const ITEMS_ENQUEUED_TOTAL: &str = "lastframe_items_enqueued_total";
    pub const ITEMS_REJECTED_TOTAL: &str = "lastframe_items_rejected_total";
    pub const FRAMES_STORED_TOTAL: &str = "lastframe_frames_stored_total";
    pub const EXTRACTION_FAILURES_TOTAL: &str = "lastframe_extraction_failures_total";
    pub const ITEMS_RETRIED_TOTAL: &str = "lastframe_items_retried_total";
    pub const QUEUE_DEPTH: &str = "lastframe_queue_depth";
    pub const EXTRACTION_DURATION_SECONDS: &str = "lastframe_extraction_duration_seconds";
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::MetricsFailed(e.to_string()))
}

pub fn record_enqueued() {
    counter!(names::ITEMS_ENQUEUED_TOTAL).increment(1);
}

/// Record a candidate that was not enqueued (`already_processed`,
/// `already_queued`, `no_source`, `queue_full`).
pub fn record_rejected(reason: &'static str) {
    counter!(names::ITEMS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_stored(backend: &'static str) {
    counter!(names::FRAMES_STORED_TOTAL, "backend" => backend).increment(1);
}

pub fn record_failure(stage: &str) {
    counter!(names::EXTRACTION_FAILURES_TOTAL, "stage" => stage.to_string()).increment(1);
}

pub fn record_retry() {
    counter!(names::ITEMS_RETRIED_TOTAL).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

pub fn record_extraction_duration(elapsed: Duration) {
    histogram!(names::EXTRACTION_DURATION_SECONDS).record(elapsed.as_secs_f64());
}
