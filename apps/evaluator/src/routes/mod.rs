pub mod evaluation;
pub mod health;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Allowance on top of the two file payloads for multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/upload", post(upload::handle_upload))
        .route("/api/v1/evaluate", post(evaluation::handle_evaluate))
        .route("/api/v1/result/:id", get(evaluation::handle_get_result))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
