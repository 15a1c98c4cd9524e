//! Chat completion envelope
//!
//! Normalized response shape for text, image, and document generation:
//! `{choices: [{message: {content}}], usage: {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Requested output format for a generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    /// Plain text, no format constraint sent.
    #[default]
    Text,
    /// Any syntactically valid JSON object.
    JsonObject,
    /// Structured outputs constrained by a JSON schema (strict mode).
    JsonSchema { name: String, schema: Value },
}

impl ResponseFormat {
    /// Schema-constrained JSON output.
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self::JsonSchema {
            name: name.into(),
            schema,
        }
    }

    /// The `response_format` payload field, if the format requires one.
    pub fn to_payload(&self) -> Option<Value> {
        match self {
            Self::Text => None,
            Self::JsonObject => Some(json!({"type": "json_object"})),
            Self::JsonSchema { name, schema } => Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "strict": true,
                    "schema": schema,
                },
            })),
        }
    }
}

/// A single message within a choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage accounting.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Normalized chat completion response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Content of the first choice, the common consumption path.
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}
