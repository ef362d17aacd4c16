use serde::de::DeserializeOwned;

use super::scores::Validate;
use crate::errors::PipelineError;

/// Recovers a JSON value of type `T` from free-form model output.
///
/// Markdown fences are dropped, then the outermost object span is decoded
/// (falling back to the outermost array span, then the whole text).
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T, PipelineError> {
    let candidate = json_span(raw);
    serde_json::from_str(candidate.trim()).map_err(|e| PipelineError::MalformedOutput {
        reason: format!("failed to decode JSON: {e}"),
        raw: raw.to_string(),
    })
}

/// [`extract_json`] followed by the payload's range checks.
pub fn extract_validated<T: DeserializeOwned + Validate>(raw: &str) -> Result<T, PipelineError> {
    let value: T = extract_json(raw)?;
    value
        .validate()
        .map_err(|reason| PipelineError::MalformedOutput {
            reason,
            raw: raw.to_string(),
        })?;
    Ok(value)
}

fn json_span(raw: &str) -> String {
    let text = raw.replace("```json", "").replace("```", "");

    if let Some(span) = span_between(&text, '{', '}') {
        return span.to_string();
    }
    if let Some(span) = span_between(&text, '[', ']') {
        return span.to_string();
    }
    text
}

fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
