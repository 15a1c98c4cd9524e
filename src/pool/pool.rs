//! Pool orchestrator
//!
//! Owns the key set and drives the cross-key retry loop: select a usable
//! key under the pool lock, dispatch through that key's client, classify
//! the outcome, update breaker/limiter/statistics, and retry until success,
//! exhaustion, or a non-retryable error.

use crate::client::{ClientConfig, OpenRouterClient};
use crate::config::PoolConfig;
use crate::error::ClientError;
use crate::pool::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::pool::rate_limiter::RateLimiter;
use crate::pool::strategy::SelectionStrategy;
use crate::schemas::{ChatCompletion, EmbeddingInput, EmbeddingResponse, ResponseFormat};
use crate::transport::{HttpTransport, Transport};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Cap on honoring Retry-After between pool attempts.
const RETRY_AFTER_CAP_SECS: u64 = 30;

/// Fixed pause when the upstream service itself is unavailable.
const SERVICE_UNAVAILABLE_BACKOFF: Duration = Duration::from_secs(30);

// ============================================================================
// Per-key state
// ============================================================================

/// Immutable per-key data: the client bound to the key and a redacted
/// label safe for logs and stats.
struct PooledKey {
    label: String,
    client: Arc<OpenRouterClient>,
}

/// Success/failure counters for one key.
#[derive(Debug, Default)]
struct KeyStats {
    successes: u64,
    failures: u64,
    total_latency: f64,
    last_error_code: Option<u16>,
}

/// Mutable per-key state, only touched while the pool lock is held.
struct KeyState {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    stats: KeyStats,
}

/// State behind the pool-wide lock: the round-robin cursor plus one
/// `KeyState` per key, in credential-list order.
struct PoolState {
    rr_index: usize,
    keys: Vec<KeyState>,
}

// ============================================================================
// Pool
// ============================================================================

/// Pool of OpenRouter API keys with rotation, per-key rate limiting, and
/// per-key circuit breaking.
pub struct OpenRouterPool {
    keys: Vec<PooledKey>,
    strategy: SelectionStrategy,
    max_retries: u32,
    rate_limit_breaker_penalty: u32,
    state: Mutex<PoolState>,
}

impl OpenRouterPool {
    /// Create a pool backed by a shared production HTTP transport.
    pub fn new(config: PoolConfig) -> Result<Self, ClientError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Create a pool with a custom transport (used by tests).
    pub fn with_transport(
        config: PoolConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let burst_size = config.burst_size();
        let mut keys = Vec::with_capacity(config.api_keys.len());
        let mut states = Vec::with_capacity(config.api_keys.len());

        for api_key in &config.api_keys {
            let client_config = ClientConfig::new(api_key)
                .with_models(
                    config.model_text.clone(),
                    config.model_vision.clone(),
                    config.model_embedding.clone(),
                )
                .with_base_url(config.base_url.clone())
                .with_app(config.app_url.clone(), config.app_name.clone())
                .with_timeout(config.timeout)
                .with_max_retries(config.client_retries);

            keys.push(PooledKey {
                label: redact(api_key),
                client: Arc::new(OpenRouterClient::new(client_config, Arc::clone(&transport))),
            });
            states.push(KeyState {
                limiter: RateLimiter::new(config.qps_per_key, burst_size),
                breaker: CircuitBreaker::new(
                    config.circuit_breaker_failure_threshold,
                    config.circuit_breaker_recovery_timeout,
                ),
                stats: KeyStats::default(),
            });
        }

        tracing::info!(
            num_keys = keys.len(),
            strategy = %config.strategy,
            qps_per_key = config.qps_per_key,
            burst_size = burst_size,
            "initialized OpenRouter pool"
        );

        Ok(Self {
            keys,
            strategy: config.strategy,
            max_retries: config.max_retries,
            rate_limit_breaker_penalty: config.rate_limit_breaker_penalty,
            state: Mutex::new(PoolState {
                rr_index: 0,
                keys: states,
            }),
        })
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Generate text from a plain prompt, rotating across keys.
    pub async fn generate_text(
        &self,
        prompt: &str,
        system_instructions: Option<&str>,
        response_format: ResponseFormat,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let format = &response_format;
        self.execute_with_pool("generate_text", move |client| async move {
            client
                .generate_text(prompt, system_instructions, format, timeout)
                .await
        })
        .await
    }

    /// Generate text grounded in an image, rotating across keys.
    pub async fn generate_from_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        response_format: ResponseFormat,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let format = &response_format;
        self.execute_with_pool("generate_from_image", move |client| async move {
            client
                .generate_from_image(prompt, image, mime_type, format, timeout)
                .await
        })
        .await
    }

    /// Generate text grounded in a PDF document, rotating across keys.
    pub async fn generate_from_pdf(
        &self,
        prompt: &str,
        document: &[u8],
        system_instructions: Option<&str>,
        response_format: ResponseFormat,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let format = &response_format;
        self.execute_with_pool("generate_from_pdf", move |client| async move {
            client
                .generate_from_pdf(prompt, document, system_instructions, format, timeout)
                .await
        })
        .await
    }

    /// Create embeddings, rotating across keys.
    pub async fn create_embedding(
        &self,
        input: impl Into<EmbeddingInput>,
        model: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<EmbeddingResponse, ClientError> {
        let input = input.into();
        let input_ref = &input;
        self.execute_with_pool("create_embedding", move |client| async move {
            client.create_embedding(input_ref, model, timeout).await
        })
        .await
    }

    /// Snapshot of per-key health and usage for monitoring. Keys are
    /// identified by their redacted suffix, never the full secret.
    pub async fn get_pool_stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let keys = self
            .keys
            .iter()
            .zip(state.keys.iter())
            .map(|(key, ks)| KeySnapshot {
                key: key.label.clone(),
                circuit_state: ks.breaker.state(),
                available_tokens: ks.limiter.available_tokens(),
                successes: ks.stats.successes,
                failures: ks.stats.failures,
                avg_latency: if ks.stats.successes > 0 {
                    ks.stats.total_latency / ks.stats.successes as f64
                } else {
                    0.0
                },
                last_error_code: ks.stats.last_error_code,
            })
            .collect();

        PoolStats {
            num_keys: self.keys.len(),
            strategy: self.strategy,
            keys,
        }
    }

    // ------------------------------------------------------------------
    // Retry loop
    // ------------------------------------------------------------------

    /// Shared retry loop behind every public operation.
    ///
    /// Budget is `num_keys * max_retries` attempts. Retryable failures
    /// update the attempted key's breaker and statistics and continue with
    /// the next selected key (after a class-specific backoff, if any);
    /// non-retryable failures propagate immediately.
    async fn execute_with_pool<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T, ClientError>
    where
        F: Fn(Arc<OpenRouterClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let max_attempts = self.keys.len() as u32 * self.max_retries;
        let mut last_error: Option<ClientError> = None;
        let mut attempts: u32 = 0;

        while attempts < max_attempts {
            attempts += 1;
            let idx = self.select_key().await;
            let client = Arc::clone(&self.keys[idx].client);
            let started = Instant::now();

            match call(client).await {
                Ok(value) => {
                    let mut state = self.state.lock().await;
                    let ks = &mut state.keys[idx];
                    ks.breaker.record_success();
                    ks.stats.successes += 1;
                    ks.stats.total_latency += started.elapsed().as_secs_f64();
                    tracing::debug!(
                        operation,
                        key = %self.keys[idx].label,
                        attempt = attempts,
                        "pool request succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    let backoff = self.handle_failure(idx, operation, &err).await;
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                    if let Some(delay) = backoff {
                        sleep(delay).await;
                    }
                }
            }
        }

        tracing::error!(operation, attempts, "pool attempt budget exhausted");
        Err(last_error.unwrap_or(ClientError::Exhausted { attempts }))
    }

    /// Record a failed attempt against the key's breaker and statistics,
    /// returning the backoff to apply before the next attempt, if any.
    async fn handle_failure(
        &self,
        idx: usize,
        operation: &str,
        err: &ClientError,
    ) -> Option<Duration> {
        let label = &self.keys[idx].label;
        let mut state = self.state.lock().await;
        let ks = &mut state.keys[idx];
        ks.stats.failures += 1;
        ks.stats.last_error_code = err.status_code();

        match err {
            ClientError::RateLimit { retry_after, .. } => {
                // Fast-track the breaker: a throttled key should drop out
                // of rotation before it burns the whole attempt budget.
                for _ in 0..self.rate_limit_breaker_penalty {
                    ks.breaker.record_failure();
                }
                tracing::warn!(
                    operation,
                    key = %label,
                    retry_after = ?retry_after,
                    "rate limited; rotating keys"
                );
                retry_after.map(|secs| Duration::from_secs(secs.min(RETRY_AFTER_CAP_SECS)))
            }
            ClientError::ServiceUnavailable(message) => {
                // Shared outage, not key health: leave the breaker alone.
                tracing::warn!(operation, error = %message, "service unavailable; backing off");
                Some(SERVICE_UNAVAILABLE_BACKOFF)
            }
            ClientError::Server { .. } | ClientError::Timeout(_) => {
                ks.breaker.record_failure();
                tracing::warn!(
                    operation,
                    key = %label,
                    error = %err,
                    "transient error; trying next key"
                );
                None
            }
            _ => {
                // Non-retryable: the failure counter is recorded for
                // observability, then the error propagates to the caller.
                ks.breaker.record_failure();
                tracing::error!(operation, key = %label, error = %err, "non-retryable error");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Key selection
    // ------------------------------------------------------------------

    /// Pick the next usable key.
    ///
    /// One atomic critical section: breaker reads, token acquisition, and
    /// the round-robin advance all happen under the pool lock, so
    /// concurrent callers never double-spend a token or race the cursor.
    /// If a full cycle finds no immediate token, one more strategy-chosen
    /// key's blocking `acquire` is awaited so selection always returns.
    async fn select_key(&self) -> usize {
        let mut state = self.state.lock().await;

        for _ in 0..self.keys.len() {
            let idx = self.next_candidate(&mut state);
            let ks = &mut state.keys[idx];
            if ks.breaker.state() == CircuitState::Open {
                continue;
            }
            if ks.limiter.try_acquire() {
                return idx;
            }
        }

        let idx = self.next_candidate(&mut state);
        tracing::debug!(key = %self.keys[idx].label, "no token available; waiting on limiter");
        state.keys[idx].limiter.acquire().await;
        idx
    }

    fn next_candidate(&self, state: &mut PoolState) -> usize {
        match self.strategy {
            SelectionStrategy::RoundRobin => {
                let idx = state.rr_index;
                state.rr_index = (state.rr_index + 1) % self.keys.len();
                idx
            }
            SelectionStrategy::LeastBusy => {
                let mut best = 0;
                let mut best_tokens = -1.0;
                for (idx, ks) in state.keys.iter().enumerate() {
                    if ks.breaker.state() == CircuitState::Open {
                        continue;
                    }
                    let tokens = ks.limiter.available_tokens();
                    if tokens > best_tokens {
                        best_tokens = tokens;
                        best = idx;
                    }
                }
                best
            }
        }
    }
}

impl std::fmt::Debug for OpenRouterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterPool")
            .field("num_keys", &self.keys.len())
            .field("strategy", &self.strategy)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Redact a key to its last 8 characters for logs and stats.
fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let start = chars.len().saturating_sub(8);
    format!("...{}", chars[start..].iter().collect::<String>())
}

// ============================================================================
// Pool statistics
// ============================================================================

/// Monitoring snapshot for one key.
#[derive(Debug, Clone, Serialize)]
pub struct KeySnapshot {
    /// Redacted key suffix.
    pub key: String,
    pub circuit_state: CircuitState,
    pub available_tokens: f64,
    pub successes: u64,
    pub failures: u64,
    /// Mean latency of successful requests, in seconds.
    pub avg_latency: f64,
    pub last_error_code: Option<u16>,
}

/// Monitoring snapshot for the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub num_keys: usize,
    pub strategy: SelectionStrategy,
    pub keys: Vec<KeySnapshot>,
}

// ============================================================================
// Tests
// ============================================================================
