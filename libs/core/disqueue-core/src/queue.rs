//! Queue Registry: declarative queue descriptors resolved to stream names.

use crate::priority::Priority;
use crate::retry::RetryStrategy;
use std::collections::HashMap;

/// A stream name of the form `disqueue:<queue>:<priority>`.
pub fn stream_name(queue: &str, priority: Priority) -> String {
    format!("disqueue:{queue}:{priority}")
}

/// A resolved, immutable queue descriptor.
#[derive(Debug, Clone)]
pub struct Queue {
    pub name: String,
    /// Ordered by canonical priority rank, highest first.
    pub priorities: Vec<Priority>,
    pub retry_strategy: RetryStrategy,
    pub retry_limit: u32,
    pub dlq_enabled: bool,
}

impl Queue {
    /// Stream names for this queue's priorities, in the same rank order.
    pub fn streams(&self) -> Vec<String> {
        self.priorities
            .iter()
            .map(|p| stream_name(&self.name, *p))
            .collect()
    }

    pub fn allows(&self, priority: Priority) -> bool {
        self.priorities.contains(&priority)
    }
}

/// A queue descriptor as read from configuration, before validation.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub priorities: Vec<Priority>,
    pub retry_strategy: RetryStrategy,
    pub retry_limit: u32,
    pub dlq_enabled: bool,
}

impl QueueConfig {
    fn resolve(self) -> Queue {
        Queue {
            name: self.name,
            priorities: Priority::sort_canonical(self.priorities),
            retry_strategy: self.retry_strategy,
            retry_limit: self.retry_limit,
            dlq_enabled: self.dlq_enabled,
        }
    }
}

/// Process-start registry of queue descriptors, consulted once at worker
/// startup to materialize `(queue, stream_manager, processor)` triples and
/// by the submission surface to validate `(queue_name, priority)` pairs.
#[derive(Debug, Clone)]
pub struct QueueRegistry {
    queues: HashMap<String, Queue>,
    /// Registration order, preserved for round-robin iteration across queues.
    order: Vec<String>,
}

impl QueueRegistry {
    pub fn new(configs: Vec<QueueConfig>) -> Self {
        let mut queues = HashMap::with_capacity(configs.len());
        let mut order = Vec::with_capacity(configs.len());
        for config in configs {
            let name = config.name.clone();
            queues.insert(name.clone(), config.resolve());
            order.push(name);
        }
        Self { queues, order }
    }

    pub fn get(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }

    /// Queues in registration order, as consumed by the worker loop.
    pub fn iter(&self) -> impl Iterator<Item = &Queue> {
        self.order.iter().map(|name| &self.queues[name])
    }

    /// Validate a `(queue_name, priority)` pair for the submission surface.
    pub fn validate(&self, queue_name: &str, priority: Priority) -> Result<(), ValidationError> {
        let queue = self
            .get(queue_name)
            .ok_or_else(|| ValidationError::UnknownQueue(queue_name.to_string()))?;
        if !queue.allows(priority) {
            return Err(ValidationError::PriorityNotAllowed(priority));
        }
        Ok(())
    }

    /// `list_queues()` per the submission/control surface.
    pub fn list(&self) -> Vec<&Queue> {
        self.order.iter().map(|name| &self.queues[name]).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UnknownQueue(String),
    PriorityNotAllowed(Priority),
}
