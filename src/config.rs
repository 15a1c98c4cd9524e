//! Pool configuration
//!
//! Immutable, builder-style configuration for the client pool. Settings can
//! be constructed in code or loaded from `OPENROUTER_*` environment
//! variables with sensible defaults.

use crate::pool::SelectionStrategy;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Default OpenRouter API base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model for text generation.
pub const DEFAULT_MODEL_TEXT: &str = "google/gemini-2.0-flash-001";

/// Default model for vision and document tasks.
pub const DEFAULT_MODEL_VISION: &str = "google/gemini-2.0-flash-001";

/// Default embedding model.
pub const DEFAULT_MODEL_EMBEDDING: &str = "openai/text-embedding-3-large";

/// Configuration for the OpenRouter pool.
///
/// Immutable after the pool is constructed. `max_retries` multiplies the
/// key count into the pool's total attempt budget; `client_retries` bounds
/// the small retry each per-key client runs on its own.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Ordered list of API keys. The order matters: round-robin cycles it
    /// and LeastBusy breaks ties by it.
    pub api_keys: Vec<String>,
    /// API base URL.
    pub base_url: String,
    /// HTTP-Referer attribution header value.
    pub app_url: String,
    /// X-Title attribution header value.
    pub app_name: String,
    /// Model for text generation.
    pub model_text: String,
    /// Model for vision and document tasks.
    pub model_vision: String,
    /// Model for embeddings.
    pub model_embedding: String,
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Attempt budget multiplier: the pool tries up to
    /// `api_keys.len() * max_retries` times.
    pub max_retries: u32,
    /// Attempts each per-key client makes internally (2 = one extra).
    pub client_retries: u32,
    /// Sustained queries-per-second allowance per key. Must be positive.
    pub qps_per_key: f64,
    /// Burst size multiplier; burst capacity is `max(1, qps * multiplier)`.
    pub burst_multiplier: f64,
    /// Key selection strategy.
    pub strategy: SelectionStrategy,
    /// Consecutive failures before a key's circuit opens.
    pub circuit_breaker_failure_threshold: u32,
    /// Cool-down before an open circuit allows a probe request.
    pub circuit_breaker_recovery_timeout: Duration,
    /// Breaker failures recorded per rate-limit error, to fast-track
    /// circuit opening for throttled keys.
    pub rate_limit_breaker_penalty: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            app_url: String::new(),
            app_name: String::new(),
            model_text: DEFAULT_MODEL_TEXT.to_string(),
            model_vision: DEFAULT_MODEL_VISION.to_string(),
            model_embedding: DEFAULT_MODEL_EMBEDDING.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            client_retries: 2,
            qps_per_key: 0.15,
            burst_multiplier: 8.1,
            strategy: SelectionStrategy::RoundRobin,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_recovery_timeout: Duration::from_secs(60),
            rate_limit_breaker_penalty: 3,
        }
    }
}

impl PoolConfig {
    /// Create a config with the given API keys and defaults for the rest.
    pub fn with_keys(api_keys: Vec<String>) -> Self {
        Self {
            api_keys,
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_app(mut self, url: impl Into<String>, name: impl Into<String>) -> Self {
        self.app_url = url.into();
        self.app_name = name.into();
        self
    }

    pub fn with_model_text(mut self, model: impl Into<String>) -> Self {
        self.model_text = model.into();
        self
    }

    pub fn with_model_vision(mut self, model: impl Into<String>) -> Self {
        self.model_vision = model.into();
        self
    }

    pub fn with_model_embedding(mut self, model: impl Into<String>) -> Self {
        self.model_embedding = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_client_retries(mut self, retries: u32) -> Self {
        self.client_retries = retries;
        self
    }

    pub fn with_qps_per_key(mut self, qps: f64) -> Self {
        self.qps_per_key = qps;
        self
    }

    pub fn with_burst_multiplier(mut self, multiplier: f64) -> Self {
        self.burst_multiplier = multiplier;
        self
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_circuit_breaker(mut self, failure_threshold: u32, recovery: Duration) -> Self {
        self.circuit_breaker_failure_threshold = failure_threshold;
        self.circuit_breaker_recovery_timeout = recovery;
        self
    }

    pub fn with_rate_limit_breaker_penalty(mut self, penalty: u32) -> Self {
        self.rate_limit_breaker_penalty = penalty;
        self
    }

    /// Burst capacity of each key's token bucket.
    pub fn burst_size(&self) -> f64 {
        (self.qps_per_key * self.burst_multiplier).floor().max(1.0)
    }

    /// Check invariants that the limiter and retry loop rely on.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.api_keys.is_empty(), "at least one API key is required");
        anyhow::ensure!(
            self.api_keys.iter().all(|k| !k.trim().is_empty()),
            "API keys must not be empty strings"
        );
        anyhow::ensure!(self.qps_per_key > 0.0, "qps_per_key must be positive");
        anyhow::ensure!(self.burst_multiplier > 0.0, "burst_multiplier must be positive");
        anyhow::ensure!(self.max_retries > 0, "max_retries must be at least 1");
        anyhow::ensure!(self.client_retries > 0, "client_retries must be at least 1");
        anyhow::ensure!(
            self.circuit_breaker_failure_threshold > 0,
            "circuit_breaker_failure_threshold must be at least 1"
        );
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `OPENROUTER_API_KEYS` (comma-separated, required) and the
    /// optional `OPENROUTER_BASE_URL`, `OPENROUTER_APP_URL`,
    /// `OPENROUTER_APP_NAME`, `OPENROUTER_MODEL_TEXT`,
    /// `OPENROUTER_MODEL_VISION`, `OPENROUTER_MODEL_EMBEDDING`,
    /// `OPENROUTER_TIMEOUT_S`, `OPENROUTER_MAX_RETRIES`,
    /// `OPENROUTER_QPS_PER_KEY`, `OPENROUTER_BURST_MULTIPLIER`,
    /// `OPENROUTER_STRATEGY`, `OPENROUTER_CB_FAILURE_THRESHOLD`, and
    /// `OPENROUTER_CB_RECOVERY_TIMEOUT_S` overrides.
    pub fn from_env() -> Result<Self> {
        let keys_raw = env::var("OPENROUTER_API_KEYS")
            .context("OPENROUTER_API_KEYS is required (comma-separated)")?;
        let api_keys: Vec<String> = keys_raw
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let mut config = Self::with_keys(api_keys);

        if let Ok(v) = env::var("OPENROUTER_BASE_URL") {
            config.base_url = v;
        }
        if let Ok(v) = env::var("OPENROUTER_APP_URL") {
            config.app_url = v;
        }
        if let Ok(v) = env::var("OPENROUTER_APP_NAME") {
            config.app_name = v;
        }
        if let Ok(v) = env::var("OPENROUTER_MODEL_TEXT") {
            config.model_text = v;
        }
        if let Ok(v) = env::var("OPENROUTER_MODEL_VISION") {
            config.model_vision = v;
        }
        if let Ok(v) = env::var("OPENROUTER_MODEL_EMBEDDING") {
            config.model_embedding = v;
        }
        if let Ok(v) = env::var("OPENROUTER_TIMEOUT_S") {
            let secs: u64 = v.parse().context("OPENROUTER_TIMEOUT_S must be an integer")?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = env::var("OPENROUTER_MAX_RETRIES") {
            config.max_retries = v
                .parse()
                .context("OPENROUTER_MAX_RETRIES must be an integer")?;
        }
        if let Ok(v) = env::var("OPENROUTER_QPS_PER_KEY") {
            config.qps_per_key = v
                .parse()
                .context("OPENROUTER_QPS_PER_KEY must be a number")?;
        }
        if let Ok(v) = env::var("OPENROUTER_BURST_MULTIPLIER") {
            config.burst_multiplier = v
                .parse()
                .context("OPENROUTER_BURST_MULTIPLIER must be a number")?;
        }
        if let Ok(v) = env::var("OPENROUTER_STRATEGY") {
            config.strategy = SelectionStrategy::parse(&v);
        }
        if let Ok(v) = env::var("OPENROUTER_CB_FAILURE_THRESHOLD") {
            config.circuit_breaker_failure_threshold = v
                .parse()
                .context("OPENROUTER_CB_FAILURE_THRESHOLD must be an integer")?;
        }
        if let Ok(v) = env::var("OPENROUTER_CB_RECOVERY_TIMEOUT_S") {
            let secs: u64 = v
                .parse()
                .context("OPENROUTER_CB_RECOVERY_TIMEOUT_S must be an integer")?;
            config.circuit_breaker_recovery_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}
