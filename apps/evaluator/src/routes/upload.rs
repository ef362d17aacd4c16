use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::{DocumentKind, NewDocument};
use crate::state::AppState;
use crate::storage::is_pdf;

#[derive(Debug, Serialize)]
pub struct UploadedDocument {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub file_type: DocumentKind,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub documents: Vec<UploadedDocument>,
}

struct PendingUpload {
    kind: DocumentKind,
    original_name: String,
    data: Bytes,
}

/// POST /api/v1/upload
/// Multipart fields `cv` and `project_report`, one PDF each. Other fields are ignored.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut pending: Vec<PendingUpload> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("failed to parse multipart form: {e}")))?
    {
        let kind = match field.name() {
            Some("cv") => DocumentKind::Cv,
            Some("project_report") => DocumentKind::ProjectReport,
            _ => continue,
        };
        if pending.iter().any(|p| p.kind == kind) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        if !is_pdf(&original_name) {
            return Err(AppError::Validation(format!(
                "{kind} must be a PDF file, got '{original_name}'"
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read {kind} upload: {e}")))?;
        if data.len() > state.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "{kind} file too large. Max size: {} bytes",
                state.max_upload_bytes
            )));
        }

        pending.push(PendingUpload {
            kind,
            original_name,
            data,
        });
    }

    if pending.is_empty() {
        return Err(AppError::Validation(
            "No valid files uploaded. Please upload 'cv' and/or 'project_report' as PDF files."
                .to_string(),
        ));
    }

    let mut documents = Vec::with_capacity(pending.len());
    for upload in pending {
        let stored = state
            .storage
            .save(upload.kind, &upload.original_name, upload.data)
            .await?;

        let created = state
            .documents
            .create(NewDocument {
                filename: stored.filename.clone(),
                original_filename: upload.original_name,
                kind: upload.kind,
                file_path: stored.path.to_string_lossy().into_owned(),
            })
            .await;

        let document = match created {
            Ok(document) => document,
            Err(e) => {
                if let Err(cleanup) = state.storage.delete(&stored.filename).await {
                    warn!("Failed to remove orphaned upload: {cleanup}");
                }
                return Err(e.into());
            }
        };

        info!(document_id = %document.id, kind = %document.kind, "Stored uploaded document");
        documents.push(UploadedDocument {
            id: document.id.to_string(),
            filename: document.filename,
            original_name: document.original_filename,
            file_type: document.kind,
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Files uploaded successfully".to_string(),
            documents,
        }),
    ))
}
