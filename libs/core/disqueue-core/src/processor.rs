//! Job Processor: dedup-gated execution, retry, and DLQ disposition (component E).

use crate::handler::HandlerRegistry;
use crate::job_store::{DedupOutcome, JobStore, Status};
use crate::metrics;
use crate::queue::Queue;
use tracing::{info, warn};

/// Outcome of one `execute()` call, per the processor protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Retrying,
    Failed,
    Duplicate,
}

/// Executes jobs for one queue under the dedup guard, coordinating status
/// transitions, retry re-enqueue, and DLQ disposition.
pub struct JobProcessor {
    job_store: JobStore,
    handlers: HandlerRegistry,
    queue: Queue,
}

impl JobProcessor {
    pub fn new(job_store: JobStore, handlers: HandlerRegistry, queue: Queue) -> Self {
        Self { job_store, handlers, queue }
    }

    /// `stream` is the stream the entry was read from — retries are
    /// re-appended to this same stream, never promoted or demoted.
    pub async fn execute(&self, job_id: &str, payload: serde_json::Value, stream: &str) -> Outcome {
        if self.job_store.acquire_dedup_lease(job_id).await == DedupOutcome::AlreadyHeld {
            info!(job_id, "duplicate delivery, dedup lease already held");
            return Outcome::Duplicate;
        }

        self.job_store.set_status(job_id, Status::InProgress).await;

        let timer = metrics::MetricsTimer::new(self.queue.name.clone());
        let result = self.handlers.dispatch(&self.queue.name, payload.clone()).await;
        drop(timer);

        match result {
            Ok(()) => {
                self.job_store.set_status(job_id, Status::Completed).await;
                self.job_store.clear_attempts(job_id).await;
                self.job_store.mark_dedup_done(job_id).await;
                metrics::record_job_completed(&self.queue.name);
                Outcome::Completed
            }
            Err(e) => self.handle_failure(job_id, payload, stream, e.to_string()).await,
        }
    }

    async fn handle_failure(&self, job_id: &str, payload: serde_json::Value, stream: &str, reason: String) -> Outcome {
        let attempts = self.job_store.incr_attempts(job_id).await;

        if self.queue.retry_strategy.should_retry(attempts) {
            self.job_store.set_status(job_id, Status::Retrying).await;
            let delay = self.queue.retry_strategy.delay(attempts);
            warn!(job_id, attempts, delay_ms = delay.as_millis() as u64, %reason, "job failed, scheduling retry");
            crate::job_store::sleep(delay).await;

            let priority = stream
                .rsplit(':')
                .next()
                .and_then(|p| p.parse().ok())
                .unwrap_or(self.queue.priorities[0]);
            self.job_store.requeue(stream, job_id, &payload, priority).await;
            self.job_store.release_dedup_lease(job_id).await;
            metrics::record_job_retried(&self.queue.name);
            Outcome::Retrying
        } else {
            self.job_store.set_status(job_id, Status::Failed).await;
            self.job_store.clear_attempts(job_id).await;
            if self.queue.dlq_enabled {
                self.job_store.send_to_dlq(job_id, &payload, &reason).await;
            }
            self.job_store.release_dedup_lease(job_id).await;
            warn!(job_id, attempts, %reason, "job exhausted retries");
            metrics::record_job_failed(&self.queue.name);
            Outcome::Failed
        }
    }
}
