use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{DocumentKind, EvaluationResult, EvaluationStatus, NewEvaluation};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub project_document_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub id: Uuid,
    pub status: EvaluationStatus,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub id: Uuid,
    pub status: EvaluationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// POST /api/v1/evaluate
/// Creates a queued job and hands it to the worker pool. The job is accepted
/// even if the pool refuses it; reconciliation picks it up later.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvaluateResponse>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let job_title = req.job_title.trim();
    if job_title.is_empty() {
        return Err(AppError::Validation("job_title is required".to_string()));
    }

    let cv = state.documents.find_by_id(req.cv_document_id).await?;
    if cv.kind != DocumentKind::Cv {
        return Err(AppError::Validation(format!(
            "document {} is a {}, not a cv",
            cv.id, cv.kind
        )));
    }
    let project = state.documents.find_by_id(req.project_document_id).await?;
    if project.kind != DocumentKind::ProjectReport {
        return Err(AppError::Validation(format!(
            "document {} is a {}, not a project_report",
            project.id, project.kind
        )));
    }

    let job = state
        .jobs
        .create(NewEvaluation {
            job_title: job_title.to_string(),
            cv_document_id: cv.id,
            project_document_id: project.id,
        })
        .await?;
    info!(job_id = %job.id, "Evaluation queued");

    if !state.queue.submit(job.id).await {
        warn!(job_id = %job.id, "Worker pool is shutting down; job left for reconciliation");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(EvaluateResponse {
            id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /api/v1/result/:id
pub async fn handle_get_result(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ResultResponse>, AppError> {
    let Path(id) =
        id.map_err(|_| AppError::Validation("Invalid evaluation ID format".to_string()))?;
    let job = state.jobs.find_by_id(id).await?;

    Ok(Json(ResultResponse {
        id: job.id,
        status: job.status,
        result: job.result,
        error_message: job
            .error_message
            .filter(|_| job.status == EvaluationStatus::Failed),
    }))
}
