//! Embedding envelope
//!
//! Normalized response shape for embedding generation:
//! `{data: [{embedding: [...], index: N}], usage: {...}}`.

use serde::{Deserialize, Serialize};

/// Input for an embedding request: a single text or a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    /// Number of texts to embed.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(texts) => texts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(text) => text.is_empty(),
            Self::Batch(texts) => texts.is_empty(),
        }
    }

    /// Total characters across all inputs, for logging.
    pub fn total_chars(&self) -> usize {
        match self {
            Self::Single(text) => text.len(),
            Self::Batch(texts) => texts.iter().map(|t| t.len()).sum(),
        }
    }
}

impl From<&str> for EmbeddingInput {
    fn from(text: &str) -> Self {
        Self::Single(text.to_string())
    }
}

impl From<String> for EmbeddingInput {
    fn from(text: String) -> Self {
        Self::Single(text)
    }
}

impl From<Vec<String>> for EmbeddingInput {
    fn from(texts: Vec<String>) -> Self {
        Self::Batch(texts)
    }
}

/// A single embedding vector with its position in the input batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Embedding {
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// Token usage for an embedding request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmbeddingUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Normalized embedding response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingResponse {
    pub data: Vec<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: EmbeddingUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_serializes_untagged() {
        let single = EmbeddingInput::from("hello");
        assert_eq!(serde_json::to_value(&single).unwrap(), serde_json::json!("hello"));

        let batch = EmbeddingInput::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            serde_json::json!(["a", "b"])
        );
    }

    #[test]
    fn test_input_accounting() {
        let batch = EmbeddingInput::from(vec!["abc".to_string(), "de".to_string()]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.total_chars(), 5);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_deserialize_response() {
        let raw = serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "openai/text-embedding-3-large",
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        });
        let response: EmbeddingResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].embedding.len(), 3);
        assert_eq!(response.data[0].index, 0);
        assert_eq!(response.usage.total_tokens, 4);
    }

    #[test]
    fn test_deserialize_response_without_usage() {
        let raw = serde_json::json!({
            "data": [{"embedding": [1.0], "index": 0}]
        });
        let response: EmbeddingResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.usage.total_tokens, 0);
    }
}
