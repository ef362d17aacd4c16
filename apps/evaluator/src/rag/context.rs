use std::sync::Arc;

use tracing::{debug, warn};

use super::{SearchResult, VectorStore};
use crate::errors::PipelineError;
use crate::llm_client::{truncate_chars, EmbeddingClient, MAX_EMBED_CHARS};
use crate::models::ReferenceCategory;

/// Rendered when retrieval finds nothing.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Results taken per category.
pub const DEFAULT_TOP_K: u64 = 3;

/// Builds the reference-context block injected into evaluation prompts.
#[derive(Clone)]
pub struct ContextAssembler {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    top_k: u64,
}

impl ContextAssembler {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: u64) -> Self {
        self.top_k = top_k;
        self
    }

    /// Embeds `query_text` once and retrieves the top matches of every category
    /// in order. A category whose search fails is skipped.
    pub async fn assemble(
        &self,
        query_text: &str,
        categories: &[ReferenceCategory],
    ) -> Result<String, PipelineError> {
        let vector = self
            .embedder
            .embed(truncate_chars(query_text, MAX_EMBED_CHARS))
            .await
            .map_err(|e| {
                PipelineError::RetrievalFailed(format!("failed to embed query: {e}"))
            })?;

        let mut results = Vec::new();
        for &category in categories {
            match self.store.query(&vector, category, self.top_k).await {
                Ok(hits) => {
                    debug!(%category, hits = hits.len(), "retrieved reference context");
                    results.extend(hits);
                }
                Err(e) => warn!(%category, "Failed to search reference context: {e}"),
            }
        }

        Ok(format_context(&results))
    }
}

pub fn format_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "--- Context {} (Score: {:.2}) ---\n{}",
                i + 1,
                r.score,
                r.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
