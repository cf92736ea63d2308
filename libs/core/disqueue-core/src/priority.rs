//! Priority labels and their canonical ordering.

use std::fmt;
use std::str::FromStr;

/// A job priority. Variant order is the canonical rank, high to low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    High,
    Medium,
    Low,
    Default,
}

impl Priority {
    /// The full priority set in canonical rank order, highest first.
    pub const ALL: [Priority; 4] = [
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Default => "default",
        }
    }

    /// Sort a set of priorities into canonical rank order, highest first.
    pub fn sort_canonical(mut priorities: Vec<Priority>) -> Vec<Priority> {
        priorities.sort();
        priorities
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "default" => Ok(Priority::Default),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("Low".parse::<Priority>().unwrap(), Priority::Low);
    }

    #[test]
    fn rejects_unknown_priority() {
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn canonical_rank_orders_high_before_low() {
        assert!(Priority::High < Priority::Low);
        assert!(Priority::Low < Priority::Default);
    }

    #[test]
    fn sort_canonical_restores_rank_order_regardless_of_input_order() {
        let sorted = Priority::sort_canonical(vec![Priority::Low, Priority::High, Priority::Medium]);
        assert_eq!(sorted, vec![Priority::High, Priority::Medium, Priority::Low]);
    }
}
