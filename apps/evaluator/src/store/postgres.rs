use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Document, DocumentKind, Evaluation, EvaluationResult, EvaluationStatus, NewDocument,
    NewEvaluation,
};
use crate::store::{DocumentStore, JobStore, StoreError};

// ────────────────────────────────────────────────────────────────────────────
// Rows
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
struct EvaluationRow {
    id: Uuid,
    job_title: String,
    cv_document_id: Uuid,
    project_document_id: Uuid,
    status: String,
    cv_match_rate: Option<f64>,
    cv_feedback: Option<String>,
    project_score: Option<f64>,
    project_feedback: Option<String>,
    overall_summary: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EvaluationRow> for Evaluation {
    type Error = StoreError;

    fn try_from(row: EvaluationRow) -> Result<Self, Self::Error> {
        let status: EvaluationStatus = row.status.parse().map_err(StoreError::InvalidRow)?;

        // The result only exists on completed rows, and then all of it must be there.
        let result = if status == EvaluationStatus::Completed {
            match (
                row.cv_match_rate,
                row.cv_feedback,
                row.project_score,
                row.project_feedback,
                row.overall_summary,
            ) {
                (
                    Some(cv_match_rate),
                    Some(cv_feedback),
                    Some(project_score),
                    Some(project_feedback),
                    Some(overall_summary),
                ) => Some(EvaluationResult {
                    cv_match_rate,
                    cv_feedback,
                    project_score,
                    project_feedback,
                    overall_summary,
                }),
                _ => {
                    return Err(StoreError::InvalidRow(format!(
                        "completed evaluation {} is missing result fields",
                        row.id
                    )))
                }
            }
        } else {
            None
        };

        let error_message = if status == EvaluationStatus::Failed {
            row.error_message
        } else {
            None
        };

        Ok(Evaluation {
            id: row.id,
            job_title: row.job_title,
            cv_document_id: row.cv_document_id,
            project_document_id: row.project_document_id,
            status,
            result,
            error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DocumentRow {
    id: Uuid,
    filename: String,
    original_filename: String,
    file_type: String,
    file_path: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let kind: DocumentKind = row.file_type.parse().map_err(StoreError::InvalidRow)?;
        Ok(Document {
            id: row.id,
            filename: row.filename,
            original_filename: row.original_filename,
            kind,
            file_path: row.file_path,
            created_at: row.created_at,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: Uuid) -> Result<Option<EvaluationStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM evaluations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        status
            .map(|s| s.parse().map_err(StoreError::InvalidRow))
            .transpose()
    }

    /// Turns a zero-row guarded update into the matching error.
    async fn rejected_transition(
        &self,
        id: Uuid,
        expected: EvaluationStatus,
    ) -> Result<(), StoreError> {
        match self.current_status(id).await? {
            None => Err(StoreError::evaluation_not_found(id)),
            Some(actual) => Err(StoreError::InvalidTransition {
                id,
                expected,
                actual,
            }),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewEvaluation) -> Result<Evaluation, StoreError> {
        let job = Evaluation::queued(new);
        let row = sqlx::query_as::<_, EvaluationRow>(
            r#"
            INSERT INTO evaluations
                (id, job_title, cv_document_id, project_document_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.job_title)
        .bind(job.cv_document_id)
        .bind(job.project_document_id)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Evaluation, StoreError> {
        sqlx::query_as::<_, EvaluationRow>("SELECT * FROM evaluations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::evaluation_not_found(id))?
            .try_into()
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: EvaluationStatus,
        to: EvaluationStatus,
    ) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE evaluations SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }

        match self.current_status(id).await? {
            None => Err(StoreError::evaluation_not_found(id)),
            Some(actual) => {
                debug!(job_id = %id, %actual, expected = %from, "status transition skipped");
                Ok(false)
            }
        }
    }

    async fn update_result(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE evaluations
            SET status = 'completed',
                cv_match_rate = $2,
                cv_feedback = $3,
                project_score = $4,
                project_feedback = $5,
                overall_summary = $6,
                error_message = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(result.cv_match_rate)
        .bind(&result.cv_feedback)
        .bind(result.project_score)
        .bind(&result.project_feedback)
        .bind(&result.overall_summary)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            Ok(())
        } else {
            self.rejected_transition(id, EvaluationStatus::Processing)
                .await
        }
    }

    async fn update_error(&self, id: Uuid, message: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE evaluations
            SET status = 'failed',
                cv_match_rate = NULL,
                cv_feedback = NULL,
                project_score = NULL,
                project_feedback = NULL,
                overall_summary = NULL,
                error_message = $2,
                updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            Ok(())
        } else {
            self.rejected_transition(id, EvaluationStatus::Processing)
                .await
        }
    }

    async fn find_pending_jobs(&self, limit: i64) -> Result<Vec<Evaluation>, StoreError> {
        sqlx::query_as::<_, EvaluationRow>(
            r#"
            SELECT * FROM evaluations
            WHERE status = 'queued'
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Evaluation::try_from)
        .collect()
    }

    async fn requeue_interrupted(&self) -> Result<u64, StoreError> {
        let requeued = sqlx::query(
            "UPDATE evaluations SET status = 'queued', updated_at = now() WHERE status = 'processing'",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(requeued)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Document store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = Document::new(new);
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (id, filename, original_filename, file_type, file_path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(document.id)
        .bind(&document.filename)
        .bind(&document.original_filename)
        .bind(document.kind.as_str())
        .bind(&document.file_path)
        .bind(document.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Document, StoreError> {
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::document_not_found(id))?
            .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> EvaluationRow {
        let now = Utc::now();
        EvaluationRow {
            id: Uuid::new_v4(),
            job_title: "Backend Engineer".to_string(),
            cv_document_id: Uuid::new_v4(),
            project_document_id: Uuid::new_v4(),
            status: status.to_string(),
            cv_match_rate: None,
            cv_feedback: None,
            project_score: None,
            project_feedback: None,
            overall_summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_completed_row_carries_result() {
        let mut r = row("completed");
        r.cv_match_rate = Some(0.7);
        r.cv_feedback = Some("Good".to_string());
        r.project_score = Some(3.5);
        r.project_feedback = Some("Fine".to_string());
        r.overall_summary = Some("Hire".to_string());

        let job = Evaluation::try_from(r).unwrap();
        assert_eq!(job.status, EvaluationStatus::Completed);
        assert_eq!(job.result.unwrap().project_score, 3.5);
    }

    #[test]
    fn test_completed_row_missing_fields_is_invalid() {
        let mut r = row("completed");
        r.cv_match_rate = Some(0.7);
        assert!(matches!(
            Evaluation::try_from(r),
            Err(StoreError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_non_completed_row_hides_stale_result_columns() {
        let mut r = row("processing");
        r.cv_match_rate = Some(0.7);
        r.error_message = Some("old".to_string());
        let job = Evaluation::try_from(r).unwrap();
        assert!(job.result.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_failed_row_keeps_error_message() {
        let mut r = row("failed");
        r.error_message = Some("Evaluate CV: boom".to_string());
        let job = Evaluation::try_from(r).unwrap();
        assert_eq!(job.error_message.as_deref(), Some("Evaluate CV: boom"));
    }

    #[test]
    fn test_unknown_status_is_invalid_row() {
        assert!(matches!(
            Evaluation::try_from(row("paused")),
            Err(StoreError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_document_row_parses_kind() {
        let doc = Document::try_from(DocumentRow {
            id: Uuid::new_v4(),
            filename: "cv_x.pdf".to_string(),
            original_filename: "me.pdf".to_string(),
            file_type: "cv".to_string(),
            file_path: "uploads/cv_x.pdf".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(doc.kind, DocumentKind::Cv);
    }
}
