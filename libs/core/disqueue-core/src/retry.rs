//! Retry strategies: pure decision objects over a post-increment attempt count.

use std::str::FromStr;
use std::time::Duration;

const EXPONENTIAL_CAP: Duration = Duration::from_secs(60);

/// A retry decision policy. Stateless and shareable across queues/workers.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    Fixed { delay: Duration, max: u32 },
    Exponential { base: Duration, factor: f64, max: u32 },
}

impl RetryStrategy {
    /// `n` is the attempt count *after* the current failure (post-increment).
    pub fn should_retry(&self, n: u32) -> bool {
        match self {
            RetryStrategy::Fixed { max, .. } => n < *max,
            RetryStrategy::Exponential { max, .. } => n < *max,
        }
    }

    /// `n` is the attempt count *after* the current failure (post-increment).
    pub fn delay(&self, n: u32) -> Duration {
        match self {
            RetryStrategy::Fixed { delay, .. } => *delay,
            RetryStrategy::Exponential { base, factor, .. } => {
                if n == 0 {
                    return Duration::ZERO;
                }
                // Clamp before constructing the Duration: factor.powi grows
                // past Duration::MAX well before the cap matters (n~67 at
                // base=500ms, factor=2.0), and from_secs_f64 panics on that.
                let millis = (base.as_secs_f64() * 1000.0 * factor.powi(n as i32 - 1)).min(EXPONENTIAL_CAP.as_millis() as f64);
                Duration::from_secs_f64(millis / 1000.0)
            }
        }
    }
}

impl FromStr for RetryStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(RetryStrategyKind::Fixed),
            "exponential" => Ok(RetryStrategyKind::Exponential),
            other => Err(other.to_string()),
        }
    }
}

/// The name of a retry strategy, as it appears in a queue descriptor or config,
/// before it has been resolved to concrete parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategyKind {
    Fixed,
    Exponential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_retries_until_max() {
        let s = RetryStrategy::Fixed { delay: Duration::from_millis(100), max: 3 };
        assert!(s.should_retry(1));
        assert!(s.should_retry(2));
        assert!(!s.should_retry(3));
        assert_eq!(s.delay(1), Duration::from_millis(100));
        assert_eq!(s.delay(2), Duration::from_millis(100));
    }

    #[test]
    fn exponential_doubles_per_attempt_and_caps_at_60s() {
        let s = RetryStrategy::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: 10,
        };
        assert_eq!(s.delay(1), Duration::from_millis(500));
        assert_eq!(s.delay(2), Duration::from_millis(1000));
        assert_eq!(s.delay(3), Duration::from_millis(2000));
        // 500ms * 2^9 = 256s, capped to 60s
        assert_eq!(s.delay(10), Duration::from_secs(60));
    }

    #[test]
    fn exponential_does_not_overflow_duration_on_large_attempt_counts() {
        let s = RetryStrategy::Exponential { base: Duration::from_millis(500), factor: 2.0, max: 200 };
        // factor.powi would blow past Duration::MAX well before n=150.
        assert_eq!(s.delay(150), Duration::from_secs(60));
    }

    #[test]
    fn exponential_should_retry_respects_max() {
        let s = RetryStrategy::Exponential { base: Duration::from_millis(1), factor: 2.0, max: 5 };
        assert!(s.should_retry(4));
        assert!(!s.should_retry(5));
    }

    #[test]
    fn parses_strategy_kind_case_insensitively() {
        assert_eq!("Fixed".parse::<RetryStrategyKind>().unwrap(), RetryStrategyKind::Fixed);
        assert_eq!("EXPONENTIAL".parse::<RetryStrategyKind>().unwrap(), RetryStrategyKind::Exponential);
        assert!("jittered".parse::<RetryStrategyKind>().is_err());
    }
}
