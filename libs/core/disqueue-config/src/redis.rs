use crate::{env_or_default, ConfigError, FromEnv};

const DEFAULT_URI: &str = "redis://127.0.0.1:6379";

/// Broker (Redis) connection configuration.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub uri: String,
}

impl RedisConfig {
    pub fn new(uri: String) -> Self {
        Self { uri }
    }
}

impl FromEnv for RedisConfig {
    /// Reads `DISQUEUE_REDIS_URL`, defaulting to a local broker.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            uri: env_or_default("DISQUEUE_REDIS_URL", DEFAULT_URI),
        })
    }
}
