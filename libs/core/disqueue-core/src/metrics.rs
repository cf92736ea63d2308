//! Prometheus metrics for queue and job processing observability.
//!
//! ## Available Metrics
//!
//! - `disqueue_jobs_completed_total` - Counter of successfully completed jobs, by queue
//! - `disqueue_jobs_retried_total` - Counter of retry re-enqueues, by queue
//! - `disqueue_jobs_failed_total` - Counter of terminally failed jobs, by queue
//! - `disqueue_job_duration_seconds` - Histogram of handler execution time, by queue
//! - `disqueue_dlq_size` - Gauge of current DLQ stream length

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const JOBS_COMPLETED: &str = "disqueue_jobs_completed_total";
    pub const JOBS_RETRIED: &str = "disqueue_jobs_retried_total";
    pub const JOBS_FAILED: &str = "disqueue_jobs_failed_total";
    pub const JOB_DURATION: &str = "disqueue_job_duration_seconds";
    pub const DLQ_SIZE: &str = "disqueue_dlq_size";
}

/// Installs the global Prometheus recorder. Call once at worker startup.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// The installed handle, if `init_metrics` has already run.
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

pub fn record_job_completed(queue: &str) {
    counter!(names::JOBS_COMPLETED, "queue" => queue.to_string()).increment(1);
}

pub fn record_job_retried(queue: &str) {
    counter!(names::JOBS_RETRIED, "queue" => queue.to_string()).increment(1);
}

pub fn record_job_failed(queue: &str) {
    counter!(names::JOBS_FAILED, "queue" => queue.to_string()).increment(1);
}

pub fn record_job_duration(queue: &str, duration: Duration) {
    histogram!(names::JOB_DURATION, "queue" => queue.to_string()).record(duration.as_secs_f64());
}

pub fn set_dlq_size(size: f64) {
    gauge!(names::DLQ_SIZE).set(size);
}

/// Times one `execute()` call and records it against `names::JOB_DURATION`
/// on drop, regardless of which outcome path was taken.
pub struct MetricsTimer {
    queue: String,
    start: std::time::Instant,
}

impl MetricsTimer {
    pub fn new(queue: impl Into<String>) -> Self {
        Self { queue: queue.into(), start: std::time::Instant::now() }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        record_job_duration(&self.queue, self.start.elapsed());
    }
}
