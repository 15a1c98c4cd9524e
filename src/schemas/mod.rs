//! Wire format types
//!
//! Request and response envelopes for the OpenAI-compatible OpenRouter API.

pub mod chat;
pub mod embedding;

pub use chat::{ChatCompletion, Choice, Message, ResponseFormat, Usage};
pub use embedding::{Embedding, EmbeddingInput, EmbeddingResponse, EmbeddingUsage};
