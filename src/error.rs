//! Client error types
//!
//! Maps OpenRouter HTTP failures to a typed taxonomy. Every variant carries
//! its retryability: the pool's retry loop absorbs retryable errors and
//! surfaces non-retryable ones immediately.

use thiserror::Error;

/// Errors produced by the transport, the per-key client, or the pool.
#[derive(Error, Debug)]
pub enum ClientError {
    /// 401/403: the API key is invalid, missing, or lacks access.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// 400/422: the request payload was rejected.
    #[error("validation error {status}: {message}")]
    Validation { status: u16, message: String },

    /// 429: key-specific rate limit exceeded.
    #[error("rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Seconds to wait, from the Retry-After header if present.
        retry_after: Option<u64>,
    },

    /// 503, or a 429 whose body signals upstream overload. Treated as a
    /// shared outage rather than a key health problem.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Any other 5xx.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The request timed out at the network layer.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Network-level failure below HTTP (connect, TLS, protocol).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx status outside the mapped taxonomy.
    #[error("unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },

    /// The response body did not match the expected envelope.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The pool ran out of attempts without ever capturing a request error.
    #[error("all keys exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// Invalid pool or client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the pool may retry this error on another key (or the same
    /// key after backoff). Auth and validation failures never recover by
    /// retrying; neither do raw transport faults or unmapped statuses.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimit { .. }
                | ClientError::ServiceUnavailable(_)
                | ClientError::Server { .. }
                | ClientError::Timeout(_)
        )
    }

    /// HTTP status associated with this error, where one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Auth(_) => Some(401),
            ClientError::Validation { status, .. } => Some(*status),
            ClientError::RateLimit { .. } => Some(429),
            ClientError::ServiceUnavailable(_) => Some(503),
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Unexpected { status, .. } => Some(*status),
            ClientError::Timeout(_)
            | ClientError::Transport(_)
            | ClientError::Parse(_)
            | ClientError::Exhausted { .. }
            | ClientError::Config(_) => None,
        }
    }

    /// Retry-After hint, only present on rate limit errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ClientError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(ClientError::RateLimit {
            message: "slow down".into(),
            retry_after: Some(5),
        }
        .is_retryable());
        assert!(ClientError::ServiceUnavailable("overloaded".into()).is_retryable());
        assert!(ClientError::Server {
            status: 502,
            message: "bad gateway".into(),
        }
        .is_retryable());
        assert!(ClientError::Timeout("deadline".into()).is_retryable());
    }

    #[test]
    fn test_non_retryable_classes() {
        assert!(!ClientError::Auth("bad key".into()).is_retryable());
        assert!(!ClientError::Validation {
            status: 422,
            message: "missing field".into(),
        }
        .is_retryable());
        assert!(!ClientError::Transport("connection reset".into()).is_retryable());
        assert!(!ClientError::Unexpected {
            status: 418,
            message: "teapot".into(),
        }
        .is_retryable());
        assert!(!ClientError::Exhausted { attempts: 6 }.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ClientError::Auth("x".into()).status_code(), Some(401));
        // Validation carries the actual status, 400 and 422 both occur
        for status in [400, 422] {
            assert_eq!(
                ClientError::Validation {
                    status,
                    message: "x".into()
                }
                .status_code(),
                Some(status)
            );
        }
        assert_eq!(
            ClientError::Server {
                status: 502,
                message: "x".into()
            }
            .status_code(),
            Some(502)
        );
        assert_eq!(ClientError::Timeout("x".into()).status_code(), None);
    }

    #[test]
    fn test_retry_after_hint() {
        let err = ClientError::RateLimit {
            message: "x".into(),
            retry_after: Some(12),
        };
        assert_eq!(err.retry_after(), Some(12));
        assert_eq!(ClientError::Timeout("x".into()).retry_after(), None);
    }
}
