//! Model API access: embeddings and text generation.
//!
//! The pipeline depends only on the `EmbeddingClient` and `GenerativeClient` traits.

use async_trait::async_trait;
use thiserror::Error;

pub mod gemini;
pub mod retry;

pub use gemini::GeminiClient;
pub use retry::generate_with_retry;

/// Inputs longer than this many chars are cut before embedding.
pub const MAX_EMBED_CHARS: usize = 40_000;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned no candidates")]
    EmptyResponse,

    #[error("embedding result was empty")]
    EmptyEmbedding,
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Returns the generated text. A successful call may return an empty string.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, LlmError>;
}

/// Cuts `text` to at most `max` chars without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
