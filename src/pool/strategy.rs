//! Key selection strategies
//!
//! Two interchangeable strategies decide which API key a request should
//! try next. Both operate over the ordered key list held by the pool.

use serde::{Deserialize, Serialize};

/// Strategy for picking the next API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionStrategy {
    /// Cycle through keys in list order, advancing on every selection
    /// attempt regardless of outcome (default).
    #[default]
    RoundRobin,
    /// Pick the key with the most available rate-limit tokens whose
    /// circuit is not open; ties broken by list order.
    LeastBusy,
}

impl SelectionStrategy {
    /// Parse from string (case-insensitive). Unknown values fall back to
    /// round-robin.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LEAST_BUSY" | "LEASTBUSY" => Self::LeastBusy,
            _ => Self::RoundRobin,
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "ROUND_ROBIN"),
            Self::LeastBusy => write!(f, "LEAST_BUSY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            SelectionStrategy::parse("ROUND_ROBIN"),
            SelectionStrategy::RoundRobin
        );
        assert_eq!(
            SelectionStrategy::parse("least_busy"),
            SelectionStrategy::LeastBusy
        );
        assert_eq!(
            SelectionStrategy::parse("unknown"),
            SelectionStrategy::RoundRobin
        );
    }

    #[test]
    fn test_display_round_trips() {
        for strategy in [SelectionStrategy::RoundRobin, SelectionStrategy::LeastBusy] {
            assert_eq!(SelectionStrategy::parse(&strategy.to_string()), strategy);
        }
    }
}
