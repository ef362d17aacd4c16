use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("file does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    #[error("no text content found in {}", .0.display())]
    Empty(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Turns a stored document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError>;
}

/// `pdf-extract` backed extractor. Parsing is CPU-bound, so it runs on the
/// blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExtractionError::Missing(path.to_path_buf())
            } else {
                ExtractionError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| ExtractionError::Pdf(format!("extraction task failed: {e}")))?
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

        let page_count = pages.len();
        let text = join_pages(&pages);
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty(path.to_path_buf()));
        }

        debug!(path = %path.display(), page_count, chars = text.len(), "extracted PDF text");
        Ok(ExtractedText { text, page_count })
    }
}

/// Renders pages with `--- Page N ---` headers. Blank pages are skipped but
/// keep their number.
pub fn join_pages(pages: &[String]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("--- Page {} ---\n", i + 1));
        out.push_str(page.trim_end());
        out.push_str("\n\n");
    }
    out
}
