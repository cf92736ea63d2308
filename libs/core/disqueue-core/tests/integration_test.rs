//! Broker-backed integration tests exercising the Job Store, Stream Manager,
//! and Job Processor together against a real Redis instance.

use async_trait::async_trait;
use disqueue_core::job_store::{DedupOutcome, Status};
use disqueue_core::{
    HandlerError, HandlerRegistry, JobHandler, JobProcessor, JobStore, Outcome, Priority, Queue,
    QueueConfig, QueueRegistry, RetryStrategy, StreamManager,
};
use redis::aio::ConnectionManager;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_utils::TestRedis;

async fn job_store(redis: &TestRedis) -> JobStore {
    let client = redis::Client::open(redis.connection_string()).unwrap();
    let manager = ConnectionManager::new(client).await.unwrap();
    JobStore::new(manager)
}

fn queue(name: &str, priorities: Vec<Priority>, retry_strategy: RetryStrategy, retry_limit: u32, dlq_enabled: bool) -> Queue {
    QueueRegistry::new(vec![QueueConfig { name: name.to_string(), priorities, retry_strategy, retry_limit, dlq_enabled }])
        .get(name)
        .unwrap()
        .clone()
}

struct AlwaysOk;

#[async_trait]
impl JobHandler for AlwaysOk {
    async fn handle(&self, _payload: serde_json::Value) -> Result<(), HandlerError> {
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl JobHandler for AlwaysFails {
    async fn handle(&self, _payload: serde_json::Value) -> Result<(), HandlerError> {
        Err(HandlerError::Failed("handler always fails".into()))
    }
}

struct CountingFails {
    calls: AtomicUsize,
}

#[async_trait]
impl JobHandler for CountingFails {
    async fn handle(&self, _payload: serde_json::Value) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Failed("boom".into()))
    }
}

/// Fails every call up to `fail_until`, then succeeds — for S2 (retry then succeed).
struct FailUntil {
    calls: AtomicUsize,
    fail_until: usize,
}

#[async_trait]
impl JobHandler for FailUntil {
    async fn handle(&self, _payload: serde_json::Value) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_until {
            Err(HandlerError::Failed("not yet".into()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn happy_path_enqueue_read_execute_completes() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue("emails", vec![Priority::Default], RetryStrategy::Fixed { delay: Duration::ZERO, max: 3 }, 3, true);

    let payload = json!({"to": "a@b.com"});
    assert!(job_store.enqueue(&q.streams()[0], "job-1", &payload, Priority::Default).await);

    let mut stream_manager = StreamManager::new(&q, job_store.clone()).await;
    let entry = stream_manager.next().await.expect("job should be readable");
    assert_eq!(entry.job_id, "job-1");

    let handlers = HandlerRegistry::new().register("emails", Arc::new(AlwaysOk));
    let processor = JobProcessor::new(job_store.clone(), handlers, q.clone());
    let stream = q.streams()[0].clone();
    let outcome = processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(job_store.get_status("job-1").await, Some(Status::Completed));

    stream_manager.advance(&stream, &entry.entry_id).await;
    assert!(stream_manager.next().await.is_none());
}

#[tokio::test]
async fn retry_exhaustion_lands_job_in_dlq() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue("reports", vec![Priority::Default], RetryStrategy::Fixed { delay: Duration::ZERO, max: 2 }, 2, true);

    let payload = json!({"report": "q3"});
    let stream = q.streams()[0].clone();
    job_store.enqueue(&stream, "job-2", &payload, Priority::Default).await;

    let mut stream_manager = StreamManager::new(&q, job_store.clone()).await;
    let handlers = HandlerRegistry::new().register("reports", Arc::new(AlwaysFails));
    let processor = JobProcessor::new(job_store.clone(), handlers, q.clone());

    // First attempt fails, schedules a retry onto the same stream.
    let entry = stream_manager.next().await.unwrap();
    let outcome = processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
    assert_eq!(outcome, Outcome::Retrying);
    stream_manager.advance(&stream, &entry.entry_id).await;

    // Second attempt exhausts the retry limit and moves the job to the DLQ.
    let entry = stream_manager.next().await.expect("retry should have been re-enqueued");
    let outcome = processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
    assert_eq!(outcome, Outcome::Failed);
    stream_manager.advance(&stream, &entry.entry_id).await;

    assert_eq!(job_store.get_status("job-2").await, Some(Status::Failed));
    assert_eq!(job_store.dlq_len().await, 1);
}

#[tokio::test]
async fn cancellation_before_dispatch_is_honored() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue("emails", vec![Priority::Default], RetryStrategy::Fixed { delay: Duration::ZERO, max: 3 }, 3, true);

    let stream = q.streams()[0].clone();
    job_store.enqueue(&stream, "job-3", &json!({}), Priority::Default).await;
    assert!(job_store.cancel("job-3").await);

    let mut stream_manager = StreamManager::new(&q, job_store.clone()).await;
    let entry = stream_manager.next().await.unwrap();

    let handler = Arc::new(CountingFails { calls: AtomicUsize::new(0) });
    let handlers = HandlerRegistry::new().register("emails", handler.clone());
    let processor = JobProcessor::new(job_store.clone(), handlers, q.clone());

    // Mirrors the worker loop's pre-dispatch check: a cancelled job is
    // skipped rather than handed to `execute`.
    if job_store.get_status(&entry.job_id).await != Some(Status::Cancelled) {
        processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
    }
    stream_manager.advance(&stream, &entry.entry_id).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(job_store.get_status("job-3").await, Some(Status::Cancelled));
}

#[tokio::test]
async fn high_priority_stream_preempts_low_priority() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue(
        "mixed",
        vec![Priority::Low, Priority::High],
        RetryStrategy::Fixed { delay: Duration::ZERO, max: 3 },
        3,
        true,
    );

    let streams = q.streams();
    let high_stream = &streams[0];
    let low_stream = &streams[1];

    job_store.enqueue(low_stream, "low-job", &json!({}), Priority::Low).await;
    job_store.enqueue(high_stream, "high-job", &json!({}), Priority::High).await;

    let stream_manager = StreamManager::new(&q, job_store.clone()).await;
    let entry = stream_manager.next().await.unwrap();

    assert_eq!(entry.job_id, "high-job");
}

#[tokio::test]
async fn concurrent_dedup_acquire_only_lets_one_caller_through() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;

    let a = job_store.acquire_dedup_lease("race-job").await;
    let b = job_store.acquire_dedup_lease("race-job").await;

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|o| **o == DedupOutcome::Acquired).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == DedupOutcome::AlreadyHeld).count(), 1);
}

#[tokio::test]
async fn cursor_advances_monotonically_and_persists() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue("emails", vec![Priority::Default], RetryStrategy::Fixed { delay: Duration::ZERO, max: 3 }, 3, true);
    let stream = q.streams()[0].clone();

    job_store.enqueue(&stream, "job-a", &json!({}), Priority::Default).await;
    job_store.enqueue(&stream, "job-b", &json!({}), Priority::Default).await;

    let mut stream_manager = StreamManager::new(&q, job_store.clone()).await;
    let first = stream_manager.next().await.unwrap();
    assert_eq!(first.job_id, "job-a");
    stream_manager.advance(&stream, &first.entry_id).await;

    assert_eq!(job_store.get_cursor(&stream).await, first.entry_id);

    let second = stream_manager.next().await.unwrap();
    assert_eq!(second.job_id, "job-b");
    assert!(second.entry_id.as_str() > first.entry_id.as_str());
}

#[tokio::test]
async fn retry_then_succeed_clears_attempts_and_marks_dedup_done() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue("payments", vec![Priority::Default], RetryStrategy::Fixed { delay: Duration::ZERO, max: 3 }, 3, true);

    let stream = q.streams()[0].clone();
    job_store.enqueue(&stream, "job-4", &json!({"fail": true}), Priority::Default).await;

    let handler = Arc::new(FailUntil { calls: AtomicUsize::new(0), fail_until: 1 });
    let handlers = HandlerRegistry::new().register("payments", handler.clone());
    let processor = JobProcessor::new(job_store.clone(), handlers, q.clone());
    let mut stream_manager = StreamManager::new(&q, job_store.clone()).await;

    // Attempt 1 fails and is re-enqueued onto the same stream as a retry.
    let entry = stream_manager.next().await.unwrap();
    let outcome = processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
    assert_eq!(outcome, Outcome::Retrying);
    assert_eq!(job_store.get_status("job-4").await, Some(Status::Retrying));
    stream_manager.advance(&stream, &entry.entry_id).await;

    // Attempt 2 succeeds.
    let entry = stream_manager.next().await.expect("retry should have been re-enqueued");
    let outcome = processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
    assert_eq!(outcome, Outcome::Completed);
    stream_manager.advance(&stream, &entry.entry_id).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(job_store.get_status("job-4").await, Some(Status::Completed));
    assert_eq!(job_store.dlq_len().await, 0);

    // A late duplicate delivery is recognized rather than re-run.
    assert_eq!(job_store.acquire_dedup_lease("job-4").await, DedupOutcome::AlreadyHeld);
}

#[tokio::test]
async fn missing_handler_drives_the_same_retry_path_as_a_handler_failure() {
    let redis = TestRedis::new().await;
    let job_store = job_store(&redis).await;
    let q = queue("unregistered", vec![Priority::Default], RetryStrategy::Fixed { delay: Duration::ZERO, max: 1 }, 1, true);

    let stream = q.streams()[0].clone();
    job_store.enqueue(&stream, "job-5", &json!({}), Priority::Default).await;

    // No handler registered for "unregistered" at all.
    let handlers = HandlerRegistry::new();
    let processor = JobProcessor::new(job_store.clone(), handlers, q.clone());
    let stream_manager = StreamManager::new(&q, job_store.clone()).await;
    let entry = stream_manager.next().await.unwrap();

    let outcome = processor.execute(&entry.job_id, entry.payload.clone(), &stream).await;
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(job_store.get_status("job-5").await, Some(Status::Failed));
    assert_eq!(job_store.dlq_len().await, 1);
}
