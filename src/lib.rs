//! Resilient OpenRouter client pool
//!
//! Multiplexes LLM API traffic across a set of API keys. Each key carries
//! its own token-bucket rate limiter and circuit breaker; the pool rotates
//! requests across healthy keys and retries transient failures on the next
//! key, so callers see a single client interface with far higher effective
//! throughput than any one key allows.
//!
//! ```no_run
//! use openrouter_pool::{OpenRouterPool, PoolConfig, ResponseFormat};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::from_env()?;
//! let pool = OpenRouterPool::new(config)?;
//!
//! let completion = pool
//!     .generate_text("Summarize this report", None, ResponseFormat::Text, None)
//!     .await?;
//! println!("{}", completion.text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod retry;
pub mod schemas;
pub mod transport;

// Re-export commonly used types
pub use client::{ClientConfig, OpenRouterClient};
pub use config::PoolConfig;
pub use error::ClientError;
pub use pool::{CircuitState, KeySnapshot, OpenRouterPool, PoolStats, SelectionStrategy};
pub use retry::BackoffPolicy;
pub use schemas::{ChatCompletion, EmbeddingInput, EmbeddingResponse, ResponseFormat};
pub use transport::{HttpTransport, Transport};
