use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::models::DocumentKind;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file extension '{0}', only .pdf is accepted")]
    InvalidExtension(String),

    #[error("failed to create upload directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file written by [`UploadStorage::save`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
}

/// Local directory holding uploaded PDFs as `{kind}_{uuid}.pdf`.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    pub async fn save(
        &self,
        kind: DocumentKind,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredFile, StorageError> {
        if !is_pdf(original_name) {
            return Err(StorageError::InvalidExtension(extension_of(original_name)));
        }

        let filename = format!("{}_{}.pdf", kind.as_str(), Uuid::new_v4());
        let path = self.root.join(&filename);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(StoredFile { filename, path })
    }

    pub async fn delete(&self, filename: &str) -> Result<(), StorageError> {
        let path = self.root.join(filename);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| StorageError::Delete { path, source })
    }
}

/// Whether `name` carries a `.pdf` extension, case-insensitively.
pub fn is_pdf(name: &str) -> bool {
    extension_of(name) == "pdf"
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_writes_pdf_with_kind_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path().join("uploads"));
        storage.ensure_dir().await.unwrap();

        let stored = storage
            .save(DocumentKind::Cv, "Jane Doe.PDF", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();

        assert!(stored.filename.starts_with("cv_"));
        assert!(stored.filename.ends_with(".pdf"));
        assert_eq!(stored.path, storage.root().join(&stored.filename));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path());

        for name in ["report.docx", "noextension"] {
            let err = storage
                .save(DocumentKind::ProjectReport, name, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidExtension(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path());
        let stored = storage
            .save(DocumentKind::ProjectReport, "report.pdf", Bytes::from_static(b"x"))
            .await
            .unwrap();

        storage.delete(&stored.filename).await.unwrap();
        assert!(!stored.path.exists());
        assert!(storage.delete(&stored.filename).await.is_err());
    }
}
