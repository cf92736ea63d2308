//! Assembles the worker's runtime configuration from the environment.
//!
//! Queue topology lives in a single `DISQUEUE_QUEUES` variable rather than
//! one variable per queue, so adding a queue is a one-line change wherever
//! the process is deployed.

use crate::error::ConfigError;
use crate::priority::Priority;
use crate::queue::{QueueConfig, QueueRegistry};
use crate::retry::{RetryStrategy, RetryStrategyKind};
use disqueue_config::redis::RedisConfig;
use disqueue_config::server::ServerConfig;
use disqueue_config::{env_or_default, Environment, FromEnv};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_QUEUE_NAME: &str = "default";

/// Fully resolved configuration for one worker process.
#[derive(Debug, Clone)]
pub struct DisqueueConfig {
    pub environment: Environment,
    pub redis: RedisConfig,
    pub health: ServerConfig,
    pub queues: QueueRegistry,
    /// Priority to assume for a submission that doesn't specify one.
    pub default_priority: Priority,
}

impl DisqueueConfig {
    /// Reads `DISQUEUE_REDIS_URL`, `HEALTH_PORT`, `APP_ENV`,
    /// `DISQUEUE_DEFAULT_PRIORITY`, and `DISQUEUE_QUEUES` (falling back to a
    /// single default queue spanning every priority when the latter is
    /// unset).
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis = RedisConfig::from_env()?;

        let health_port = env_or_default("HEALTH_PORT", "8080");
        let health = ServerConfig::new(
            std::net::Ipv4Addr::UNSPECIFIED.to_string(),
            health_port
                .parse()
                .map_err(|_| ConfigError::InvalidQueueDescriptor("HEALTH_PORT".into(), health_port.clone()))?,
        );

        let default_priority_raw = env_or_default("DISQUEUE_DEFAULT_PRIORITY", "default");
        let default_priority = Priority::from_str(&default_priority_raw).map_err(ConfigError::UnknownPriority)?;

        let retry_params = RetryParams::from_env()?;
        let queues = match std::env::var("DISQUEUE_QUEUES") {
            Ok(raw) => parse_queues(&raw, &retry_params)?,
            Err(_) => vec![default_queue(&retry_params)?],
        };

        Ok(Self {
            environment: Environment::from_env(),
            redis,
            health,
            queues: QueueRegistry::new(queues),
            default_priority,
        })
    }
}

/// Numeric retry parameters shared by every queue that doesn't override them.
struct RetryParams {
    fixed_delay_ms: u64,
    exp_base_ms: u64,
    exp_factor: f64,
}

impl RetryParams {
    fn from_env() -> Result<Self, ConfigError> {
        let fixed_delay_ms = parse_env_u64("DISQUEUE_RETRY_FIXED_DELAY_MS", 1000)?;
        let exp_base_ms = parse_env_u64("DISQUEUE_RETRY_EXP_BASE_MS", 500)?;
        let exp_factor = env_or_default("DISQUEUE_RETRY_EXP_FACTOR", "2.0")
            .parse()
            .map_err(|_| ConfigError::InvalidQueueDescriptor("DISQUEUE_RETRY_EXP_FACTOR".into(), "not a number".into()))?;
        Ok(Self { fixed_delay_ms, exp_base_ms, exp_factor })
    }

    fn strategy(&self, kind: RetryStrategyKind, max: u32) -> RetryStrategy {
        match kind {
            RetryStrategyKind::Fixed => RetryStrategy::Fixed { delay: Duration::from_millis(self.fixed_delay_ms), max },
            RetryStrategyKind::Exponential => RetryStrategy::Exponential {
                base: Duration::from_millis(self.exp_base_ms),
                factor: self.exp_factor,
                max,
            },
        }
    }
}

fn parse_env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let raw = env_or_default(key, &default.to_string());
    raw.parse().map_err(|_| ConfigError::InvalidQueueDescriptor(key.into(), raw))
}

fn default_queue(retry_params: &RetryParams) -> Result<QueueConfig, ConfigError> {
    let kind = RetryStrategyKind::from_str(&env_or_default("DISQUEUE_RETRY_STRATEGY", "exponential"))
        .map_err(ConfigError::UnknownRetryStrategy)?;
    let max = parse_env_u64("DISQUEUE_RETRY_MAX", 5)? as u32;

    Ok(QueueConfig {
        name: DEFAULT_QUEUE_NAME.to_string(),
        priorities: Priority::ALL.to_vec(),
        retry_strategy: retry_params.strategy(kind, max),
        retry_limit: max,
        dlq_enabled: true,
    })
}

/// Parses `name:priority,priority:strategy:retry_limit:dlq_enabled` entries
/// separated by `;`, e.g. `emails:high,medium:exponential:5:true`.
fn parse_queues(raw: &str, retry_params: &RetryParams) -> Result<Vec<QueueConfig>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| parse_queue_entry(entry, retry_params))
        .collect()
}

fn parse_queue_entry(entry: &str, retry_params: &RetryParams) -> Result<QueueConfig, ConfigError> {
    let fields: Vec<&str> = entry.split(':').collect();
    let [name, priorities_raw, strategy_raw, retry_limit_raw, dlq_raw] = fields.as_slice() else {
        return Err(ConfigError::InvalidQueueDescriptor(
            entry.to_string(),
            "expected name:priorities:strategy:retry_limit:dlq_enabled".into(),
        ));
    };

    let priorities = priorities_raw
        .split(',')
        .map(|p| Priority::from_str(p.trim()).map_err(ConfigError::UnknownPriority))
        .collect::<Result<Vec<_>, _>>()?;

    let kind = RetryStrategyKind::from_str(strategy_raw).map_err(ConfigError::UnknownRetryStrategy)?;
    let retry_limit: u32 = retry_limit_raw
        .parse()
        .map_err(|_| ConfigError::InvalidQueueDescriptor(entry.to_string(), "retry_limit is not a number".into()))?;
    let dlq_enabled: bool = dlq_raw
        .parse()
        .map_err(|_| ConfigError::InvalidQueueDescriptor(entry.to_string(), "dlq_enabled is not a bool".into()))?;

    Ok(QueueConfig {
        name: name.to_string(),
        priorities,
        retry_strategy: retry_params.strategy(kind, retry_limit),
        retry_limit,
        dlq_enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RetryParams {
        RetryParams { fixed_delay_ms: 1000, exp_base_ms: 500, exp_factor: 2.0 }
    }

    #[test]
    fn parses_single_queue_entry() {
        let queues = parse_queues("emails:high,medium:exponential:5:true", &params()).unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].name, "emails");
        assert_eq!(queues[0].priorities, vec![Priority::High, Priority::Medium]);
        assert_eq!(queues[0].retry_limit, 5);
        assert!(queues[0].dlq_enabled);
    }

    #[test]
    fn parses_multiple_queue_entries() {
        let queues = parse_queues("a:high:fixed:3:false;b:low:exponential:2:true", &params()).unwrap();
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].name, "a");
        assert_eq!(queues[1].name, "b");
    }

    #[test]
    fn rejects_malformed_entry() {
        assert!(parse_queues("emails:high", &params()).is_err());
    }

    #[test]
    fn rejects_unknown_priority_or_strategy() {
        assert!(parse_queues("q:bogus:fixed:1:true", &params()).is_err());
        assert!(parse_queues("q:high:bogus:1:true", &params()).is_err());
    }
}
