use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::pdf::ExtractionError;
use crate::llm_client::LlmError;
use crate::storage::StorageError;
use crate::store::StoreError;

// ────────────────────────────────────────────────────────────────────────────
// Pipeline errors
// ────────────────────────────────────────────────────────────────────────────

/// Errors raised while running one evaluation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error("context retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("generation failed after {attempts} attempt(s): {source}")]
    GenerationFailed {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("malformed model output: {reason}")]
    MalformedOutput { reason: String, raw: String },

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => PipelineError::NotFound(what),
            other => PipelineError::PersistenceFailed(other),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP errors
// ────────────────────────────────────────────────────────────────────────────

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
