//! DisQueue core: a priority-aware job queue atop a Redis-shaped broker.
//!
//! # Architecture
//!
//! ```text
//! submit() -> broker stream disqueue:<queue>:<priority>
//!               ↓ (StreamManager, strict priority order)
//!             JobProcessor::execute()
//!               ↓ (dedup lease, handler dispatch)
//!             completed | retrying (re-enqueued) | failed -> DLQ
//! ```
//!
//! A `Worker` owns one `StreamManager`/`JobProcessor` pair per registered
//! queue and drains them cooperatively on a single task; there is no
//! intra-worker concurrency. Horizontal scale comes from running more
//! worker processes against the same broker.

pub mod config;
pub mod error;
pub mod handler;
pub mod health;
pub mod job_store;
pub mod metrics;
pub mod priority;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod stream_manager;
pub mod worker;

pub use config::DisqueueConfig;
pub use error::{ConfigError, HandlerError};
pub use handler::{HandlerRegistry, JobHandler};
pub use health::{health_router, HealthState};
pub use job_store::{DedupOutcome, JobStore, Status, StreamEntry};
pub use priority::Priority;
pub use processor::{JobProcessor, Outcome};
pub use queue::{Queue, QueueConfig, QueueRegistry, ValidationError};
pub use retry::{RetryStrategy, RetryStrategyKind};
pub use stream_manager::StreamManager;
pub use worker::Worker;
