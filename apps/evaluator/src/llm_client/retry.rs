use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{GenerativeClient, LlmError};
use crate::errors::PipelineError;

/// Calls `client.generate` up to `max_attempts` times (at least once).
///
/// The first success is returned as-is, empty text included. After each failed
/// attempt the token is checked; once cancelled no further attempt is made.
pub async fn generate_with_retry(
    client: &dyn GenerativeClient,
    prompt: &str,
    temperature: f32,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    let max_attempts = max_attempts.max(1);
    let mut last_error: Option<LlmError> = None;

    for attempt in 1..=max_attempts {
        match client.generate(prompt, temperature).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                if attempt < max_attempts {
                    warn!(attempt, max_attempts, "generation attempt failed: {e}. Retrying...");
                }
                last_error = Some(e);
            }
        }
    }

    Err(PipelineError::GenerationFailed {
        attempts: max_attempts,
        source: last_error.unwrap_or(LlmError::EmptyResponse),
    })
}
