//! Retrieval over embedded reference documents.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::ReferenceCategory;

pub mod context;
pub mod memory;
pub mod qdrant;

pub use context::{ContextAssembler, NO_CONTEXT};
pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;

/// One embedded chunk of a reference document.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRecord {
    pub id: String,
    pub category: ReferenceCategory,
    /// Name of the document the chunk was cut from.
    pub source: String,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub category: String,
    /// Remaining payload fields.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to Qdrant at '{url}': {message}")]
    ConnectionFailed { url: String, message: String },

    #[error("failed to create collection '{collection}': {message}")]
    CreateCollectionFailed { collection: String, message: String },

    #[error("failed to upsert points to '{collection}': {message}")]
    UpsertFailed { collection: String, message: String },

    #[error("failed to search in '{collection}': {message}")]
    SearchFailed { collection: String, message: String },

    #[error("failed to delete points from '{collection}': {message}")]
    DeleteFailed { collection: String, message: String },

    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Nearest-neighbour store of embedded reference chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces the record with the same id.
    async fn upsert(&self, record: EmbeddedRecord) -> Result<(), VectorStoreError>;

    /// Top `limit` records of `category`, best match first.
    async fn query(
        &self,
        vector: &[f32],
        category: ReferenceCategory,
        limit: u64,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;

    async fn delete(&self, id: &str) -> Result<(), VectorStoreError>;

    /// Removes every record of `category` cut from `source`.
    async fn delete_source(
        &self,
        category: ReferenceCategory,
        source: &str,
    ) -> Result<(), VectorStoreError>;
}
