//! Job Store: typed facade over the broker (component A).
//!
//! Broker errors are caught here, logged with context, and surfaced to the
//! caller as a boolean/`Option` rather than propagated — per the error
//! handling design, no broker exception crosses this boundary.

use crate::priority::Priority;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const JOB_STATUS_HASH: &str = "job_status";
const JOB_RETRIES_HASH: &str = "job_retries";
const JOB_LAST_IDS_HASH: &str = "job_last_ids";
const DLQ_STREAM: &str = "job:dlq";

const DEDUP_PROCESSING_TTL: u64 = 3600;
const DEDUP_DONE_TTL: u64 = 86_400;

const BLOCK_MS: usize = 1000;

/// Wire status literals, in the order the data model's lifecycle visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    InProgress,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::InProgress => "in_progress",
            Status::Retrying => "retrying",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are never overwritten by the processor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }

    /// Cancellable iff queued or retrying, per the cancellation semantics.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Status::Queued | Status::Retrying)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Status::Queued),
            "in_progress" => Ok(Status::InProgress),
            "retrying" => Ok(Status::Retrying),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            "cancelled" => Ok(Status::Cancelled),
            other => Err(other.to_string()),
        }
    }
}

/// A single stream entry as returned by `read_next`.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub entry_id: String,
    pub job_id: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
}

/// Result of a dedup lease acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    Acquired,
    AlreadyHeld,
}

/// Typed facade over the broker's streams, hashes, and conditional keys.
#[derive(Clone)]
pub struct JobStore {
    redis: Arc<ConnectionManager>,
}

impl JobStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis: Arc::new(redis) }
    }

    fn conn(&self) -> ConnectionManager {
        (*self.redis).clone()
    }

    /// Appends `{job_id, payload, priority}` to `stream`, sets status `queued`,
    /// and initializes the retry counter to zero. Returns false on broker
    /// error (logged, not raised).
    pub async fn enqueue(&self, stream: &str, job_id: &str, payload: &serde_json::Value, priority: Priority) -> bool {
        match self.try_enqueue(stream, job_id, payload, priority).await {
            Ok(()) => true,
            Err(e) => {
                error!(stream, job_id, error = %e, "failed to enqueue job");
                false
            }
        }
    }

    async fn try_enqueue(&self, stream: &str, job_id: &str, payload: &serde_json::Value, priority: Priority) -> redis::RedisResult<()> {
        let mut conn = self.conn();
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "payload serialization", e.to_string())))?;

        redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("job_id")
            .arg(job_id)
            .arg("payload")
            .arg(&payload_json)
            .arg("priority")
            .arg(priority.as_str())
            .query_async::<String>(&mut conn)
            .await?;

        conn.hset::<_, _, _, ()>(JOB_STATUS_HASH, job_id, Status::Queued.as_str()).await?;
        conn.hset::<_, _, _, ()>(JOB_RETRIES_HASH, job_id, 0).await?;
        Ok(())
    }

    /// Re-appends `{job_id, payload}` onto the same stream a retrying job
    /// came from, without resetting status/attempts (the processor owns
    /// those transitions on the retry path).
    pub async fn requeue(&self, stream: &str, job_id: &str, payload: &serde_json::Value, priority: Priority) -> bool {
        let mut conn = self.conn();
        let result: redis::RedisResult<String> = async {
            let payload_json = serde_json::to_string(payload)
                .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "payload serialization", e.to_string())))?;
            redis::cmd("XADD")
                .arg(stream)
                .arg("*")
                .arg("job_id")
                .arg(job_id)
                .arg("payload")
                .arg(&payload_json)
                .arg("priority")
                .arg(priority.as_str())
                .query_async(&mut conn)
                .await
        }
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(stream, job_id, error = %e, "failed to re-enqueue retrying job");
                false
            }
        }
    }

    /// Returns the single entry with identifier strictly greater than
    /// `cursor`; blocks up to ~1s awaiting arrival; returns `None` on
    /// timeout or broker error.
    pub async fn read_next(&self, stream: &str, cursor: &str) -> Option<StreamEntry> {
        let mut conn = self.conn();
        let opts = StreamReadOptions::default().count(1).block(BLOCK_MS);

        let result: redis::RedisResult<StreamReadReply> = conn.xread_options(&[stream], &[cursor], &opts).await;

        match result {
            Ok(reply) => reply
                .keys
                .into_iter()
                .flat_map(|k| k.ids)
                .next()
                .and_then(|msg| match parse_entry(&msg.id, &msg.map) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(stream, entry_id = %msg.id, error = %e, "failed to parse stream entry");
                        None
                    }
                }),
            // A BLOCK timeout with nothing to read comes back as `Ok` with
            // an empty reply, not an `Err` — anything reaching this branch
            // is a genuine broker/transport failure.
            Err(e) => {
                error!(stream, error = %e, "failed to read from stream");
                None
            }
        }
    }

    pub async fn get_status(&self, job_id: &str) -> Option<Status> {
        let mut conn = self.conn();
        match conn.hget::<_, _, Option<String>>(JOB_STATUS_HASH, job_id).await {
            Ok(Some(raw)) => Status::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                error!(job_id, error = %e, "failed to read job status");
                None
            }
        }
    }

    pub async fn set_status(&self, job_id: &str, status: Status) {
        let mut conn = self.conn();
        if let Err(e) = conn.hset::<_, _, _, ()>(JOB_STATUS_HASH, job_id, status.as_str()).await {
            error!(job_id, %status, error = %e, "failed to write job status");
        }
    }

    /// Increments and returns the post-increment attempt count. Returns 1 if
    /// the broker call fails (treated as a first observed attempt so the
    /// retry strategy still makes forward progress).
    pub async fn incr_attempts(&self, job_id: &str) -> u32 {
        let mut conn = self.conn();
        match conn.hincr::<_, _, _, i64>(JOB_RETRIES_HASH, job_id, 1).await {
            Ok(n) => n.max(0) as u32,
            Err(e) => {
                error!(job_id, error = %e, "failed to increment retry count");
                1
            }
        }
    }

    pub async fn clear_attempts(&self, job_id: &str) {
        let mut conn = self.conn();
        if let Err(e) = conn.hdel::<_, _, ()>(JOB_RETRIES_HASH, job_id).await {
            error!(job_id, error = %e, "failed to clear retry count");
        }
    }

    /// The cursor for `stream`, defaulting to `"0"` (read from the beginning).
    pub async fn get_cursor(&self, stream: &str) -> String {
        let mut conn = self.conn();
        match conn.hget::<_, _, Option<String>>(JOB_LAST_IDS_HASH, stream).await {
            Ok(Some(id)) => id,
            Ok(None) => "0".to_string(),
            Err(e) => {
                error!(stream, error = %e, "failed to read stream cursor, defaulting to 0");
                "0".to_string()
            }
        }
    }

    pub async fn set_cursor(&self, stream: &str, entry_id: &str) {
        let mut conn = self.conn();
        if let Err(e) = conn.hset::<_, _, _, ()>(JOB_LAST_IDS_HASH, stream, entry_id).await {
            error!(stream, entry_id, error = %e, "failed to persist stream cursor");
        }
    }

    pub async fn clear_all_cursors(&self) {
        let mut conn = self.conn();
        if let Err(e) = conn.del::<_, ()>(JOB_LAST_IDS_HASH).await {
            error!(error = %e, "failed to clear stream cursors");
        }
    }

    pub async fn send_to_dlq(&self, job_id: &str, payload: &serde_json::Value, reason: &str) {
        let mut conn = self.conn();
        let payload_json = match serde_json::to_string(payload) {
            Ok(s) => s,
            Err(e) => {
                error!(job_id, error = %e, "failed to serialize payload for DLQ");
                return;
            }
        };
        let result: redis::RedisResult<String> = redis::cmd("XADD")
            .arg(DLQ_STREAM)
            .arg("*")
            .arg("job_id")
            .arg(job_id)
            .arg("payload")
            .arg(&payload_json)
            .arg("reason")
            .arg(reason)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(_) => debug!(job_id, reason, "job moved to DLQ"),
            Err(e) => error!(job_id, error = %e, "failed to move job to DLQ"),
        }
    }

    /// Current length of the DLQ stream, for the health/admin surface.
    pub async fn dlq_len(&self) -> u64 {
        let mut conn = self.conn();
        conn.xlen(DLQ_STREAM).await.unwrap_or_else(|e| {
            error!(error = %e, "failed to read DLQ length");
            0
        })
    }

    /// Only writes `cancelled` if a status entry already exists; does not
    /// inspect the current value (see the cancel-race design note).
    pub async fn cancel(&self, job_id: &str) -> bool {
        let mut conn = self.conn();
        match conn.hexists::<_, _, bool>(JOB_STATUS_HASH, job_id).await {
            Ok(true) => {
                if let Err(e) = conn.hset::<_, _, _, ()>(JOB_STATUS_HASH, job_id, Status::Cancelled.as_str()).await {
                    error!(job_id, error = %e, "failed to write cancelled status");
                    return false;
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(job_id, error = %e, "failed to check job status for cancel");
                false
            }
        }
    }

    /// Conditionally creates `dedup:<job_id>` with value `processing` and a
    /// ~1 hour TTL. The first caller gets `Acquired`; concurrent callers get
    /// `AlreadyHeld`.
    pub async fn acquire_dedup_lease(&self, job_id: &str) -> DedupOutcome {
        let mut conn = self.conn();
        let key = dedup_key(job_id);
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(DEDUP_PROCESSING_TTL));
        match conn.set_options::<_, _, Option<String>>(&key, "processing", opts).await {
            Ok(Some(_)) => DedupOutcome::Acquired,
            Ok(None) => DedupOutcome::AlreadyHeld,
            Err(e) => {
                error!(job_id, error = %e, "failed to acquire dedup lease; treating as already held");
                DedupOutcome::AlreadyHeld
            }
        }
    }

    pub async fn mark_dedup_done(&self, job_id: &str) {
        let mut conn = self.conn();
        let key = dedup_key(job_id);
        if let Err(e) = conn.set_ex::<_, _, ()>(&key, "done", DEDUP_DONE_TTL).await {
            error!(job_id, error = %e, "failed to mark dedup lease done");
        }
    }

    pub async fn release_dedup_lease(&self, job_id: &str) {
        let mut conn = self.conn();
        let key = dedup_key(job_id);
        if let Err(e) = conn.del::<_, ()>(&key).await {
            error!(job_id, error = %e, "failed to release dedup lease");
        }
    }
}

fn dedup_key(job_id: &str) -> String {
    format!("dedup:{job_id}")
}

fn parse_entry(entry_id: &str, map: &std::collections::HashMap<String, redis::Value>) -> Result<StreamEntry, String> {
    let job_id = field_as_string(map, "job_id")?;
    let payload_raw = field_as_string(map, "payload")?;
    let priority_raw = field_as_string(map, "priority")?;
    let payload: serde_json::Value = serde_json::from_str(&payload_raw).map_err(|e| e.to_string())?;
    let priority = Priority::from_str(&priority_raw)?;
    Ok(StreamEntry { entry_id: entry_id.to_string(), job_id, payload, priority })
}

fn field_as_string(map: &std::collections::HashMap<String, redis::Value>, field: &str) -> Result<String, String> {
    match map.get(field) {
        Some(redis::Value::BulkString(bytes)) => {
            String::from_utf8(bytes.clone()).map_err(|e| e.to_string())
        }
        Some(redis::Value::SimpleString(s)) => Ok(s.clone()),
        Some(other) => Err(format!("unexpected redis value for field '{field}': {other:?}")),
        None => Err(format!("missing field '{field}'")),
    }
}

/// Blocking retry-delay sleep, suspended rather than parked (see design notes).
pub async fn sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_wire_literals() {
        for status in [
            Status::Queued,
            Status::InProgress,
            Status::Retrying,
            Status::Completed,
            Status::Failed,
            Status::Cancelled,
        ] {
            assert_eq!(Status::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn terminal_statuses_are_completed_failed_cancelled() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Cancelled.is_terminal());
        assert!(!Status::Queued.is_terminal());
        assert!(!Status::InProgress.is_terminal());
        assert!(!Status::Retrying.is_terminal());
    }

    #[test]
    fn only_queued_and_retrying_are_cancellable() {
        assert!(Status::Queued.is_cancellable());
        assert!(Status::Retrying.is_cancellable());
        assert!(!Status::InProgress.is_cancellable());
        assert!(!Status::Completed.is_cancellable());
    }

    #[test]
    fn dedup_key_matches_broker_key_layout() {
        assert_eq!(dedup_key("j1"), "dedup:j1");
    }
}
