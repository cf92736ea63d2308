//! Error types shared across the job store, processor, and worker loop.
//!
//! Per the processor's error handling design, none of these ever cross the
//! worker's top-level loop: broker failures are logged and treated as
//! "no message" / "continue"; only configuration failures at startup are
//! fatal.

use thiserror::Error;

/// Errors from a job handler invocation.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("no handler registered for queue '{0}'")]
    NotFound(String),

    #[error("handler failed: {0}")]
    Failed(String),
}

/// Startup configuration errors — the only errors allowed to abort the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] disqueue_config::ConfigError),

    #[error("invalid queue descriptor '{0}': {1}")]
    InvalidQueueDescriptor(String, String),

    #[error("unknown priority '{0}'")]
    UnknownPriority(String),

    #[error("unknown retry strategy '{0}'")]
    UnknownRetryStrategy(String),
}
