//! HTTP transport layer
//!
//! The `Transport` trait is the seam between request shaping and the wire:
//! production code uses `HttpTransport` (reqwest), tests substitute mocks
//! that return canned results. Status-to-error mapping happens here so that
//! mocks can inject typed errors directly.

use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// Abstract transport for OpenRouter API calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one HTTP request and return the parsed JSON response, or a
    /// typed error mapped from the HTTP status / network failure.
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, ClientError>;
}

/// Production transport backed by a shared reqwest connection pool.
///
/// The pool is safe for concurrent use; one instance is shared across all
/// per-key clients.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let mut builder = self.client.request(method, url).timeout(timeout).json(body);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(format!("request timed out: {e}"))
            } else {
                ClientError::Transport(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(format!("response read timed out: {e}"))
            } else {
                ClientError::Transport(format!("failed to read response body: {e}"))
            }
        })?;
        let data: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({"raw_text": text}));

        map_status(status.as_u16(), retry_after, data)
    }
}

/// Map an HTTP status plus parsed body to the error taxonomy.
///
/// A 429 whose error message mentions upstream overload is reclassified as
/// a service-level outage so the pool backs off instead of penalizing the
/// key.
fn map_status(status: u16, retry_after: Option<u64>, data: Value) -> Result<Value, ClientError> {
    match status {
        200..=299 => Ok(data),
        401 => Err(ClientError::Auth(error_message(&data, "Invalid API key"))),
        403 => Err(ClientError::Auth(error_message(&data, "Access forbidden"))),
        429 => {
            let message = error_message(&data, "Rate limit exceeded");
            if message.to_lowercase().contains("overloaded") {
                Err(ClientError::ServiceUnavailable(message))
            } else {
                Err(ClientError::RateLimit {
                    message,
                    retry_after,
                })
            }
        }
        s @ (400 | 422) => Err(ClientError::Validation {
            status: s,
            message: error_message(&data, "Validation error"),
        }),
        503 => Err(ClientError::ServiceUnavailable(error_message(
            &data,
            "Service temporarily unavailable",
        ))),
        s if s >= 500 => Err(ClientError::Server {
            status: s,
            message: error_message(&data, &format!("Server error: {s}")),
        }),
        s => Err(ClientError::Unexpected {
            status: s,
            message: error_message(&data, &format!("Unexpected status: {s}")),
        }),
    }
}

/// Pull `error.message` out of an API error body, with a fallback.
fn error_message(data: &Value, default: &str) -> String {
    data.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(message: &str) -> Value {
        json!({"error": {"message": message}})
    }

    #[test]
    fn test_success_passes_body_through() {
        let data = json!({"choices": []});
        let result = map_status(200, None, data.clone()).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn test_auth_statuses() {
        assert!(matches!(
            map_status(401, None, body("bad key")),
            Err(ClientError::Auth(m)) if m == "bad key"
        ));
        assert!(matches!(
            map_status(403, None, json!({})),
            Err(ClientError::Auth(m)) if m == "Access forbidden"
        ));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = map_status(429, Some(17), body("slow down")).unwrap_err();
        assert!(matches!(
            err,
            ClientError::RateLimit {
                retry_after: Some(17),
                ..
            }
        ));
    }

    #[test]
    fn test_overloaded_429_is_service_error() {
        let err = map_status(429, Some(5), body("Provider is overloaded")).unwrap_err();
        assert!(matches!(err, ClientError::ServiceUnavailable(_)));
    }

    #[test]
    fn test_validation_statuses() {
        for status in [400, 422] {
            assert!(matches!(
                map_status(status, None, body("bad field")),
                Err(ClientError::Validation { status: s, .. }) if s == status
            ));
        }
    }

    #[test]
    fn test_server_errors() {
        assert!(matches!(
            map_status(503, None, json!({})),
            Err(ClientError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            map_status(502, None, json!({})),
            Err(ClientError::Server { status: 502, .. })
        ));
        assert!(matches!(
            map_status(500, None, json!({})),
            Err(ClientError::Server { status: 500, .. })
        ));
    }

    #[test]
    fn test_unmapped_status() {
        assert!(matches!(
            map_status(418, None, json!({})),
            Err(ClientError::Unexpected { status: 418, .. })
        ));
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(error_message(&json!({"raw_text": "oops"}), "default"), "default");
        assert_eq!(error_message(&body("specific"), "default"), "specific");
    }
}
