use std::sync::Arc;

use crate::storage::UploadStorage;
use crate::store::{DocumentStore, JobStore};
use crate::worker::JobQueue;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub storage: UploadStorage,
    /// Producer side of the worker pool; submissions after shutdown are refused.
    pub queue: JobQueue,
    pub max_upload_bytes: usize,
}
