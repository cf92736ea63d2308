//! Worker: single cooperative task draining every registered queue (component F).
//!
//! One `Worker` owns every `(StreamManager, JobProcessor)` pair and visits
//! them in registration order on each pass. There is no intra-worker
//! concurrency: horizontal scale comes from running more worker processes,
//! each independently competing for the same dedup leases.

use crate::job_store::{JobStore, Status};
use crate::processor::JobProcessor;
use crate::stream_manager::StreamManager;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Idle cooldown after a pass finds nothing to do on any queue.
const IDLE_SLEEP: Duration = Duration::from_millis(100);

struct QueueWorker {
    stream_manager: StreamManager,
    processor: JobProcessor,
    job_store: JobStore,
}

/// Drains every registered queue in round-robin, registration order.
///
/// Within a queue, the `StreamManager` enforces strict priority; across
/// queues, each gets one `next()` attempt per pass before the worker moves
/// on, so a busy low-priority queue cannot starve a quiet one.
pub struct Worker {
    queues: Vec<QueueWorker>,
}

impl Worker {
    pub fn new(queues: Vec<(StreamManager, JobProcessor, JobStore)>) -> Self {
        let queues = queues
            .into_iter()
            .map(|(stream_manager, processor, job_store)| QueueWorker { stream_manager, processor, job_store })
            .collect();
        Self { queues }
    }

    /// Runs until `shutdown` reports `true`, checked between passes and
    /// during the idle cooldown so a shutdown lands within one in-flight job.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(queues = self.queues.len(), "worker starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut did_work = false;

            for qw in &mut self.queues {
                if *shutdown.borrow() {
                    break;
                }

                let Some(entry) = qw.stream_manager.next().await else {
                    continue;
                };
                did_work = true;

                let stream = crate::queue::stream_name(qw.stream_manager.queue_name(), entry.priority);

                // A cancellation recorded while the job sat on the stream is
                // honored here, before dispatch, rather than mid-handler.
                if qw.job_store.get_status(&entry.job_id).await == Some(Status::Cancelled) {
                    debug!(job_id = %entry.job_id, "skipping cancelled job");
                } else {
                    qw.processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
                }

                qw.stream_manager.advance(&stream, &entry.entry_id).await;
            }

            if !did_work {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                }
            }
        }

        info!("worker stopped");
    }
}
