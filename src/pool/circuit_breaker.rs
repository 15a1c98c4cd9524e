//! Per-key circuit breaker
//!
//! Failure-isolation state machine that stops routing to a persistently
//! failing key without permanently removing it. The OPEN → HALF_OPEN
//! transition is evaluated lazily when state is read, so no timer task is
//! needed: once the recovery timeout has elapsed, the breaker reports
//! HALF_OPEN and the next request acts as the recovery probe.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, requests allowed.
    Closed,
    /// Key is rejected from selection.
    Open,
    /// Cool-down elapsed; a single probe request is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_count: u32,
    open: bool,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            failure_count: 0,
            open: false,
            opened_at: None,
        }
    }

    /// Current state, with the OPEN → HALF_OPEN transition applied lazily.
    pub fn state(&self) -> CircuitState {
        if !self.open {
            return CircuitState::Closed;
        }
        match self.opened_at {
            Some(opened_at) if opened_at.elapsed() >= self.recovery_timeout => {
                CircuitState::HalfOpen
            }
            _ => CircuitState::Open,
        }
    }

    /// Record a successful request. Always resets the failure count and
    /// closes the circuit (HALF_OPEN probe succeeded, or normal traffic).
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.open = false;
        self.opened_at = None;
    }

    /// Record a failed request. A failure during the HALF_OPEN probe
    /// re-opens immediately; otherwise the circuit trips once the count
    /// reaches the threshold.
    pub fn record_failure(&mut self) {
        if self.state() == CircuitState::HalfOpen {
            self.failure_count += 1;
            self.trip();
            return;
        }
        self.failure_count += 1;
        if self.failure_count >= self.failure_threshold {
            self.trip();
        }
    }

    fn trip(&mut self) {
        self.open = true;
        self.opened_at = Some(Instant::now());
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_exactly_at_threshold() {
        let mut cb = breaker();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let mut cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        // Count restarts from zero, so two more failures do not trip it
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_only_after_recovery_timeout() {
        let mut cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        advance(Duration::from_secs(59)).await;
        assert_eq!(cb.state(), CircuitState::Open);

        advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let mut cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        advance(Duration::from_secs(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let mut cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        advance(Duration::from_secs(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // opened_at was refreshed: the full timeout must elapse again
        advance(Duration::from_secs(59)).await;
        assert_eq!(cb.state(), CircuitState::Open);
        advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_one_opens_on_first_failure() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(10));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
