//! Job and document persistence contracts.
//!
//! The pipeline only talks to these traits. `PgJobStore`/`PgDocumentStore` back
//! the running service; the in-memory stores back tests and local runs.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Document, Evaluation, EvaluationResult, EvaluationStatus, NewDocument, NewEvaluation,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryDocumentStore, MemoryJobStore};
pub use postgres::{PgDocumentStore, PgJobStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("evaluation {id} is {actual}, expected {expected}")]
    InvalidTransition {
        id: Uuid,
        expected: EvaluationStatus,
        actual: EvaluationStatus,
    },

    #[error("invalid stored row: {0}")]
    InvalidRow(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn evaluation_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("evaluation {id}"))
    }

    pub fn document_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("document {id}"))
    }
}

/// Owner of evaluation jobs. Every status change goes through one of the
/// transition methods below; result and error fields are never written directly.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a job in `Queued`.
    async fn create(&self, new: NewEvaluation) -> Result<Evaluation, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Evaluation, StoreError>;

    /// Compare-and-set status change. Returns `Ok(false)` when the job exists
    /// but is not currently in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: EvaluationStatus,
        to: EvaluationStatus,
    ) -> Result<bool, StoreError>;

    /// `Processing → Completed`, attaching the result in the same write.
    async fn update_result(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError>;

    /// `Processing → Failed`, recording the error message.
    async fn update_error(&self, id: Uuid, message: &str) -> Result<(), StoreError>;

    /// Jobs still in `Queued`, oldest first.
    async fn find_pending_jobs(&self, limit: i64) -> Result<Vec<Evaluation>, StoreError>;

    /// Moves every job left in `Processing` back to `Queued`. Only safe before
    /// any worker of this process has started.
    async fn requeue_interrupted(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, new: NewDocument) -> Result<Document, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Document, StoreError>;
}
