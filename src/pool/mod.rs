//! Key pool
//!
//! This module composes the per-key rate limiter, circuit breaker, and
//! selection strategy into the `OpenRouterPool` orchestrator that rotates
//! requests across API keys.

pub mod circuit_breaker;
pub mod pool;
pub mod rate_limiter;
pub mod strategy;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use pool::{KeySnapshot, OpenRouterPool, PoolStats};
pub use rate_limiter::RateLimiter;
pub use strategy::SelectionStrategy;
