//! Reference-document ingestion: PDF text → chunks → embeddings → vector store.

pub mod chunker;
pub mod pdf;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::{truncate_chars, EmbeddingClient, MAX_EMBED_CHARS};
use crate::models::ReferenceCategory;
use crate::rag::{EmbeddedRecord, VectorStore, VectorStoreError};
use chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use pdf::{ExtractionError, TextExtractor};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("failed to clear earlier chunks of '{source_name}': {error}")]
    Clear {
        source_name: String,
        #[source]
        error: VectorStoreError,
    },
}

/// Outcome of ingesting one reference document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub category: ReferenceCategory,
    pub pages: usize,
    pub chunks: usize,
    pub stored: usize,
    pub failed: usize,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

pub struct ReferenceIngestor {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ReferenceIngestor {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Extracts, chunks and stores `path` under `category`. Chunk ids are
    /// `{category}_{file_stem}_chunk_{i}`. Chunks left by an earlier ingest of
    /// the same file are removed first. A failing chunk is logged and counted,
    /// not fatal.
    pub async fn ingest(
        &self,
        path: &Path,
        category: ReferenceCategory,
    ) -> Result<IngestReport, IngestError> {
        let extracted = self.extractor.extract(path).await?;
        info!(
            path = %path.display(),
            %category,
            pages = extracted.page_count,
            chars = extracted.text.chars().count(),
            "Extracted reference document"
        );

        let chunks = chunk_text(&extracted.text, self.chunk_size, self.chunk_overlap);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        self.store
            .delete_source(category, &stem)
            .await
            .map_err(|error| IngestError::Clear {
                source_name: stem.clone(),
                error,
            })?;

        let mut report = IngestReport {
            category,
            pages: extracted.page_count,
            chunks: chunks.len(),
            stored: 0,
            failed: 0,
        };

        for (i, chunk) in chunks.into_iter().enumerate() {
            let vector = match self.embedder.embed(truncate_chars(&chunk, MAX_EMBED_CHARS)).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(%category, chunk = i, "Failed to embed chunk: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            let record = EmbeddedRecord {
                id: format!("{category}_{stem}_chunk_{i}"),
                category,
                source: stem.clone(),
                text: chunk,
                vector,
            };
            match self.store.upsert(record).await {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    warn!(%category, chunk = i, "Failed to store chunk: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            %category,
            chunks = report.chunks,
            stored = report.stored,
            failed = report.failed,
            "Ingested reference document"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::llm_client::LlmError;
    use crate::rag::MemoryVectorStore;
    use super::pdf::ExtractedText;

    struct StaticExtractor(String);

    #[async_trait]
    impl TextExtractor for StaticExtractor {
        async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
            if path.ends_with("missing.pdf") {
                return Err(ExtractionError::Missing(path.to_path_buf()));
            }
            Ok(ExtractedText {
                text: self.0.clone(),
                page_count: 2,
            })
        }
    }

    /// Fails every `fail_every`-th call (1-based); 0 never fails.
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail_every: usize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && call % self.fail_every == 0 {
                return Err(LlmError::EmptyEmbedding);
            }
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn ingestor(text: &str, fail_every: usize, store: Arc<MemoryVectorStore>) -> ReferenceIngestor {
        ReferenceIngestor::new(
            Arc::new(StaticExtractor(text.to_string())),
            Arc::new(CountingEmbedder {
                calls: AtomicUsize::new(0),
                fail_every,
            }),
            store,
        )
    }

    fn three_paragraphs() -> String {
        ["a".repeat(900), "b".repeat(900), "c".repeat(900)].join("\n\n")
    }

    #[tokio::test]
    async fn test_ingest_stores_every_chunk() {
        let store = Arc::new(MemoryVectorStore::new());
        let report = ingestor(&three_paragraphs(), 0, store.clone())
            .ingest(Path::new("refs/Job_Description.pdf"), ReferenceCategory::JobDescription)
            .await
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.stored, 3);
        assert!(report.is_complete());
        assert_eq!(store.len().await, 3);

        let hits = store
            .query(&[1.0, 0.0, 0.0], ReferenceCategory::JobDescription, 10)
            .await
            .unwrap();
        let mut ids: Vec<_> = hits.into_iter().map(|h| h.id).collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "job_description_Job_Description_chunk_0",
                "job_description_Job_Description_chunk_1",
                "job_description_Job_Description_chunk_2",
            ]
        );
    }

    #[tokio::test]
    async fn test_two_documents_in_one_category_do_not_collide() {
        let store = Arc::new(MemoryVectorStore::new());
        let ingestor = ingestor(&three_paragraphs(), 0, store.clone());
        for path in ["refs/case_study_brief.pdf", "refs/submission.pdf"] {
            ingestor
                .ingest(&PathBuf::from(path), ReferenceCategory::CaseStudy)
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 6);
    }

    #[tokio::test]
    async fn test_chunk_failures_are_counted() {
        let store = Arc::new(MemoryVectorStore::new());
        let report = ingestor(&three_paragraphs(), 2, store.clone())
            .ingest(Path::new("rubric.pdf"), ReferenceCategory::CvRubric)
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.stored, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.is_complete());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_returned() {
        let store = Arc::new(MemoryVectorStore::new());
        let err = ingestor("text", 0, store.clone())
            .ingest(Path::new("missing.pdf"), ReferenceCategory::ProjectRubric)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Extraction(ExtractionError::Missing(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reingest_of_shorter_document_drops_stale_chunks() {
        let store = Arc::new(MemoryVectorStore::new());
        let path = Path::new("refs/scoring_rubric.pdf");

        ingestor(&three_paragraphs(), 0, store.clone())
            .ingest(path, ReferenceCategory::CvRubric)
            .await
            .unwrap();
        ingestor(&three_paragraphs(), 0, store.clone())
            .ingest(path, ReferenceCategory::ProjectRubric)
            .await
            .unwrap();
        assert_eq!(store.len().await, 6);

        let report = ingestor("Only one short paragraph now.", 0, store.clone())
            .ingest(path, ReferenceCategory::CvRubric)
            .await
            .unwrap();
        assert_eq!(report.stored, 1);

        let hits = store
            .query(&[1.0, 0.0, 0.0], ReferenceCategory::CvRubric, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "cv_rubric_scoring_rubric_chunk_0");
        assert_eq!(hits[0].text, "Only one short paragraph now.");
        assert_eq!(store.len().await, 4, "other categories keep their chunks");
    }

    #[tokio::test]
    async fn test_clear_failure_stops_ingest() {
        struct Unreachable;

        #[async_trait]
        impl VectorStore for Unreachable {
            async fn upsert(&self, _record: EmbeddedRecord) -> Result<(), VectorStoreError> {
                unreachable!("nothing is stored when clearing fails")
            }

            async fn query(
                &self,
                _vector: &[f32],
                _category: ReferenceCategory,
                _limit: u64,
            ) -> Result<Vec<crate::rag::SearchResult>, VectorStoreError> {
                Ok(Vec::new())
            }

            async fn delete(&self, _id: &str) -> Result<(), VectorStoreError> {
                Ok(())
            }

            async fn delete_source(
                &self,
                _category: ReferenceCategory,
                _source: &str,
            ) -> Result<(), VectorStoreError> {
                Err(VectorStoreError::DeleteFailed {
                    collection: "test".to_string(),
                    message: "connection refused".to_string(),
                })
            }
        }

        let ingestor = ReferenceIngestor::new(
            Arc::new(StaticExtractor(three_paragraphs())),
            Arc::new(CountingEmbedder {
                calls: AtomicUsize::new(0),
                fail_every: 0,
            }),
            Arc::new(Unreachable),
        );
        let err = ingestor
            .ingest(Path::new("refs/rubric.pdf"), ReferenceCategory::CvRubric)
            .await
            .unwrap_err();
        match err {
            IngestError::Clear { source_name, .. } => assert_eq!(source_name, "rubric"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
