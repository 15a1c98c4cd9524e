//! Per-key OpenRouter client
//!
//! One client per API key. Shapes the outbound payload for each operation,
//! sends it through the shared transport, and runs a small bounded retry of
//! its own. Cross-key rotation and circuit breaking live in the pool; the
//! client only knows about its single key.

use crate::error::ClientError;
use crate::retry::BackoffPolicy;
use crate::schemas::{ChatCompletion, EmbeddingInput, EmbeddingResponse, ResponseFormat};
use crate::transport::Transport;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Cap on honoring Retry-After inside the client's internal retry.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(60);

/// Fixed backoff for upstream service outages.
const SERVICE_ERROR_BACKOFF: Duration = Duration::from_secs(30);

const MAX_TOKENS: u32 = 8192;
const TEMPERATURE_TEXT: f64 = 0.7;
// Low temperature keeps vision/document extraction output stable.
const TEMPERATURE_VISION: f64 = 0.1;

/// Configuration for a single-key client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub model_text: String,
    pub model_vision: String,
    pub model_embedding: String,
    pub base_url: String,
    pub app_url: String,
    pub app_name: String,
    pub timeout: Duration,
    /// Total attempts per request (2 = one retry).
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_text: crate::config::DEFAULT_MODEL_TEXT.to_string(),
            model_vision: crate::config::DEFAULT_MODEL_VISION.to_string(),
            model_embedding: crate::config::DEFAULT_MODEL_EMBEDDING.to_string(),
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            app_url: String::new(),
            app_name: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_models(
        mut self,
        text: impl Into<String>,
        vision: impl Into<String>,
        embedding: impl Into<String>,
    ) -> Self {
        self.model_text = text.into();
        self.model_vision = vision.into();
        self.model_embedding = embedding.into();
        self
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// OpenRouter API client bound to one key.
pub struct OpenRouterClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl OpenRouterClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Generate text from a plain prompt.
    pub async fn generate_text(
        &self,
        prompt: &str,
        system_instructions: Option<&str>,
        response_format: &ResponseFormat,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let mut messages = Vec::new();
        if let Some(system) = system_instructions {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut payload = json!({
            "model": self.config.model_text,
            "messages": messages,
            "temperature": TEMPERATURE_TEXT,
            "max_tokens": MAX_TOKENS,
        });
        if let Some(format) = response_format.to_payload() {
            payload["response_format"] = format;
        }

        tracing::debug!(
            model = %self.config.model_text,
            prompt_length = prompt.len(),
            has_system = system_instructions.is_some(),
            "generate_text"
        );

        self.chat_request(payload, timeout).await
    }

    /// Generate text grounded in an image.
    pub async fn generate_from_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        response_format: &ResponseFormat,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(image));
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": data_url}},
            ],
        })];

        let mut payload = json!({
            "model": self.config.model_vision,
            "messages": messages,
            "temperature": TEMPERATURE_VISION,
            "max_tokens": MAX_TOKENS,
        });
        if let Some(format) = response_format.to_payload() {
            payload["response_format"] = format;
        }

        tracing::debug!(
            model = %self.config.model_vision,
            prompt_length = prompt.len(),
            image_size = image.len(),
            mime_type = mime_type,
            "generate_from_image"
        );

        self.chat_request(payload, timeout).await
    }

    /// Generate text grounded in a PDF document.
    pub async fn generate_from_pdf(
        &self,
        prompt: &str,
        document: &[u8],
        system_instructions: Option<&str>,
        response_format: &ResponseFormat,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let data_url = format!("data:application/pdf;base64,{}", STANDARD.encode(document));

        let mut messages = Vec::new();
        if let Some(system) = system_instructions {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "file", "file": {"filename": "document.pdf", "file_data": data_url}},
            ],
        }));

        let mut payload = json!({
            "model": self.config.model_vision,
            "messages": messages,
            "temperature": TEMPERATURE_VISION,
            "max_tokens": MAX_TOKENS,
            // Force the Mistral OCR engine for consistent PDF parsing.
            "plugins": [{"id": "file-parser", "pdf": {"engine": "mistral-ocr"}}],
        });
        if let Some(format) = response_format.to_payload() {
            payload["response_format"] = format;
        }

        tracing::debug!(
            model = %self.config.model_vision,
            prompt_length = prompt.len(),
            document_size = document.len(),
            "generate_from_pdf"
        );

        self.chat_request(payload, timeout).await
    }

    /// Create embeddings for one or more texts.
    pub async fn create_embedding(
        &self,
        input: &EmbeddingInput,
        model: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<EmbeddingResponse, ClientError> {
        let effective_model = model.unwrap_or(&self.config.model_embedding);
        let payload = json!({
            "model": effective_model,
            "input": input,
        });

        tracing::debug!(
            model = effective_model,
            input_count = input.len(),
            total_chars = input.total_chars(),
            "create_embedding"
        );

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let raw = self.request_with_retry(&url, payload, timeout).await?;
        serde_json::from_value(raw).map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn chat_request(
        &self,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletion, ClientError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let raw = self.request_with_retry(&url, payload, timeout).await?;
        serde_json::from_value(raw).map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Send a request with the client's internal bounded retry.
    ///
    /// Non-retryable errors propagate on the first occurrence. Retryable
    /// ones sleep with class-aware delays: Retry-After (capped) for rate
    /// limits, a fixed pause for service outages, exponential backoff with
    /// jitter otherwise.
    async fn request_with_retry(
        &self,
        url: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let headers = self.build_headers();
        let effective_timeout = timeout.unwrap_or(self.config.timeout);

        for attempt in 0..self.config.max_retries {
            match self
                .transport
                .request(Method::POST, url, &headers, &payload, effective_timeout)
                .await
            {
                Ok(data) => return Ok(data),
                Err(err) => {
                    if !err.is_retryable() || attempt + 1 >= self.config.max_retries {
                        return Err(err);
                    }

                    let delay = match &err {
                        ClientError::RateLimit {
                            retry_after: Some(secs),
                            ..
                        } => Duration::from_secs(*secs).min(RETRY_AFTER_CAP),
                        ClientError::ServiceUnavailable(_) => SERVICE_ERROR_BACKOFF,
                        _ => self.config.backoff.delay_for_attempt(attempt),
                    };

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_s = delay.as_secs_f64(),
                        error = %err,
                        "retrying request"
                    );
                    sleep(delay).await;
                }
            }
        }

        // Unreachable with max_retries >= 1; kept as a typed backstop.
        Err(ClientError::Exhausted {
            attempts: self.config.max_retries,
        })
    }

    fn build_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.config.api_key),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if !self.config.app_url.is_empty() {
            headers.push(("HTTP-Referer".to_string(), self.config.app_url.clone()));
        }
        if !self.config.app_name.is_empty() {
            headers.push(("X-Title".to_string(), self.config.app_name.clone()));
        }
        headers
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("model_text", &self.config.model_text)
            .field("model_vision", &self.config.model_vision)
            .field("timeout", &self.config.timeout)
            .finish_non_exhaustive()
    }
}
