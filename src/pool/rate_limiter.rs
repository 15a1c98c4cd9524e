//! Per-key token bucket rate limiter
//!
//! Tokens refill continuously at `qps` up to `burst_size` and are spent one
//! per admitted request. Accounting is floating-point, with the same
//! elapsed-time refill formula applied on every access so the bucket never
//! drifts. Mutation happens only under the pool's selection lock; callers
//! that just need a load signal use the read-only snapshot.
//!
//! `qps` must be positive; `PoolConfig::validate` enforces this before a
//! limiter is ever constructed.

use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    qps: f64,
    burst_size: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(qps: f64, burst_size: f64) -> Self {
        Self {
            qps,
            burst_size,
            tokens: burst_size,
            last_refill: Instant::now(),
        }
    }

    /// Apply the elapsed-time refill, capped at the burst size.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.qps).min(self.burst_size);
        self.last_refill = now;
    }

    /// Try to take one token without waiting. Returns false if the bucket
    /// holds less than a full token after refill.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take one token, sleeping until it becomes available. Never returns
    /// without having obtained a token.
    pub async fn acquire(&mut self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let wait = ((1.0 - self.tokens) / self.qps).max(0.0);
            sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Current token count after a virtual refill. Does not mutate state;
    /// used by the LeastBusy strategy and the stats snapshot.
    pub fn available_tokens(&self) -> f64 {
        let elapsed = Instant::now().duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.qps).min(self.burst_size)
    }

    pub fn burst_size(&self) -> f64 {
        self.burst_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_starts_full_and_stays_bounded() {
        let limiter = RateLimiter::new(2.0, 4.0);
        assert_eq!(limiter.available_tokens(), 4.0);

        // Refill never exceeds burst even after a long idle period
        advance(Duration::from_secs(3600)).await;
        assert_eq!(limiter.available_tokens(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_spends_tokens() {
        let mut limiter = RateLimiter::new(1.0, 2.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(limiter.available_tokens() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refusal_until_refill_interval_elapses() {
        let mut limiter = RateLimiter::new(1.0, 1.0);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // Just short of 1/qps: still refused
        advance(Duration::from_millis(900)).await;
        assert!(!limiter.try_acquire());

        advance(Duration::from_millis(100)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_tokens_is_read_only() {
        let limiter = RateLimiter::new(1.0, 1.0);
        let before = limiter.available_tokens();
        let _ = limiter.available_tokens();
        assert_eq!(limiter.available_tokens(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_token() {
        let mut limiter = RateLimiter::new(1.0, 1.0);
        let started = Instant::now();

        // First call drains the bucket, the next two must wait ~1s each
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        let after_second = started.elapsed();
        assert!(after_second >= Duration::from_millis(950));
        assert!(after_second <= Duration::from_millis(1100));

        limiter.acquire().await;
        let after_third = started.elapsed();
        assert!(after_third >= Duration::from_millis(1900));
        assert!(after_third <= Duration::from_millis(2200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_negative() {
        let mut limiter = RateLimiter::new(0.5, 1.0);
        assert!(limiter.try_acquire());
        for _ in 0..5 {
            assert!(!limiter.try_acquire());
        }
        assert!(limiter.available_tokens() >= 0.0);
        assert!(limiter.available_tokens() <= limiter.burst_size());
    }
}
