//! Stream Manager: per-queue, priority-ordered cursor draining (component D).

use crate::job_store::{JobStore, StreamEntry};
use crate::queue::Queue;
use std::collections::HashMap;
use tracing::debug;

/// Holds the ordered stream list for one queue and a per-stream cursor cache
/// seeded from the Job Store at construction.
pub struct StreamManager {
    queue_name: String,
    streams: Vec<String>,
    cursors: HashMap<String, String>,
    job_store: JobStore,
}

impl StreamManager {
    /// Seeds the cursor cache from the broker-persisted values (or `"0"`).
    pub async fn new(queue: &Queue, job_store: JobStore) -> Self {
        let streams = queue.streams();
        let mut cursors = HashMap::with_capacity(streams.len());
        for stream in &streams {
            let cursor = job_store.get_cursor(stream).await;
            cursors.insert(stream.clone(), cursor);
        }
        Self { queue_name: queue.name.clone(), streams, cursors, job_store }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Iterates streams in priority order; returns the first entry found.
    /// Strict priority: a lower-priority entry is never returned while a
    /// higher-priority stream has an unread entry within the same pass.
    /// Fairness is intentionally not provided.
    pub async fn next(&self) -> Option<StreamEntry> {
        for stream in &self.streams {
            let cursor = self.cursors.get(stream).map(String::as_str).unwrap_or("0");
            if let Some(entry) = self.job_store.read_next(stream, cursor).await {
                return Some(entry);
            }
        }
        None
    }

    /// Updates the in-memory cursor and persists it. Called regardless of
    /// job outcome — this is what makes message handling at-least-once with
    /// per-message acknowledgment.
    pub async fn advance(&mut self, stream: &str, entry_id: &str) {
        self.cursors.insert(stream.to_string(), entry_id.to_string());
        self.job_store.set_cursor(stream, entry_id).await;
        debug!(queue = %self.queue_name, stream, entry_id, "cursor advanced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use crate::retry::RetryStrategy;

    fn queue(priorities: Vec<Priority>) -> Queue {
        Queue {
            name: "q".into(),
            priorities: Priority::sort_canonical(priorities),
            retry_strategy: RetryStrategy::Fixed { delay: std::time::Duration::ZERO, max: 3 },
            retry_limit: 3,
            dlq_enabled: true,
        }
    }

    #[test]
    fn stream_list_follows_canonical_priority_rank() {
        let q = queue(vec![Priority::Low, Priority::High, Priority::Medium]);
        assert_eq!(
            q.streams(),
            vec!["disqueue:q:high", "disqueue:q:medium", "disqueue:q:low"]
        );
    }
}
