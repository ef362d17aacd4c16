use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Document, Evaluation, EvaluationResult, EvaluationStatus, NewDocument, NewEvaluation,
};
use crate::store::{DocumentStore, JobStore, StoreError};

/// Process-local job store. Used by tests and by local runs without Postgres.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Evaluation>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a job as-is, bypassing `create`.
    pub async fn insert(&self, job: Evaluation) {
        self.jobs.write().await.insert(job.id, job);
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: EvaluationStatus,
        apply: impl FnOnce(&mut Evaluation) + Send,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::evaluation_not_found(id))?;

        if job.status != expected {
            return Err(StoreError::InvalidTransition {
                id,
                expected,
                actual: job.status,
            });
        }

        apply(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new: NewEvaluation) -> Result<Evaluation, StoreError> {
        let job = Evaluation::queued(new);
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Evaluation, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::evaluation_not_found(id))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: EvaluationStatus,
        to: EvaluationStatus,
    ) -> Result<bool, StoreError> {
        match self.transition(id, from, |job| job.status = to).await {
            Ok(()) => Ok(true),
            Err(StoreError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update_result(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError> {
        let result = result.clone();
        self.transition(id, EvaluationStatus::Processing, move |job| {
            job.status = EvaluationStatus::Completed;
            job.result = Some(result);
            job.error_message = None;
        })
        .await
    }

    async fn update_error(&self, id: Uuid, message: &str) -> Result<(), StoreError> {
        let message = message.to_string();
        self.transition(id, EvaluationStatus::Processing, move |job| {
            job.status = EvaluationStatus::Failed;
            job.result = None;
            job.error_message = Some(message);
        })
        .await
    }

    async fn find_pending_jobs(&self, limit: i64) -> Result<Vec<Evaluation>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut pending: Vec<Evaluation> = jobs
            .values()
            .filter(|job| job.status == EvaluationStatus::Queued)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn requeue_interrupted(&self) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();
        let mut requeued = 0;
        for job in jobs
            .values_mut()
            .filter(|job| job.status == EvaluationStatus::Processing)
        {
            job.status = EvaluationStatus::Queued;
            job.updated_at = now;
            requeued += 1;
        }
        Ok(requeued)
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = Document::new(new);
        self.documents
            .write()
            .await
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Document, StoreError> {
        self.documents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::document_not_found(id))
    }
}
