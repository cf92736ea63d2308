//! Handler Registry: process-wide `queue_name -> handler(payload)` lookup.
//!
//! Handlers are user code; the core only defines the interface and the
//! lookup table populated at startup.

use crate::error::HandlerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A job handler takes the decoded payload and runs to completion or error.
///
/// Per the design notes, this surfaces as a single-method interface so
/// handler variants can be enumerated via the registry rather than through
/// ad hoc dispatch.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> Result<(), HandlerError>;
}

/// Process-wide `queue_name -> handler` table, populated at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, queue_name: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(queue_name.into(), handler);
        self
    }

    /// A missing handler is treated by the processor the same as a handler
    /// failure, driving the same retry/DLQ path.
    pub async fn dispatch(&self, queue_name: &str, payload: serde_json::Value) -> Result<(), HandlerError> {
        match self.handlers.get(queue_name) {
            Some(handler) => handler.handle(payload).await,
            None => Err(HandlerError::NotFound(queue_name.to_string())),
        }
    }
}
