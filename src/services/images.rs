//! Product image persistence.
//!
//! Devices attach product photos to sync pushes as base64 payloads. The store
//! decodes and writes them under a configured media directory as
//! `<product-uuid>.png`; the relative file name is what gets persisted on the
//! product row. Attachment is best-effort by contract: callers log a failed
//! store and carry on with the upsert.

use crate::errors::ServiceError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Storage seam for product images. Filesystem in production; tests point the
/// same implementation at a temp directory.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Decodes the base64 payload and persists it, returning the relative
    /// path to record on the product.
    async fn store_png(&self, product_id: Uuid, base64_data: &str) -> Result<String, ServiceError>;

    /// Removes a previously stored image. Missing files are not an error.
    async fn remove(&self, relative_path: &str) -> Result<(), ServiceError>;
}

/// Writes images to a flat directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn store_png(&self, product_id: Uuid, base64_data: &str) -> Result<String, ServiceError> {
        // Tolerate data-URI framing ("data:image/png;base64,...."): only the
        // part after the last comma is the payload.
        let raw = base64_data.trim();
        let payload = raw.rsplit(',').next().unwrap_or(raw);

        let bytes = STANDARD.decode(payload).map_err(|e| {
            ServiceError::ValidationError(format!("Image payload is not valid base64: {}", e))
        })?;

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            ServiceError::InternalError(format!(
                "Failed to create media directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let file_name = format!("{}.png", product_id);
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            ServiceError::InternalError(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(%product_id, bytes = bytes.len(), "stored product image");
        Ok(file_name)
    }

    async fn remove(&self, relative_path: &str) -> Result<(), ServiceError> {
        let path = self.root.join(relative_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::InternalError(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_removes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());
        let id = Uuid::new_v4();

        let name = store.store_png(id, "aGVsbG8gcG9zeW5j").await.unwrap();
        assert_eq!(name, format!("{}.png", id));

        let written = tokio::fs::read(dir.path().join(&name)).await.unwrap();
        assert_eq!(written, b"hello posync");

        store.remove(&name).await.unwrap();
        // A second remove of the same file stays quiet.
        store.remove(&name).await.unwrap();
    }

    #[tokio::test]
    async fn strips_data_uri_framing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());
        let id = Uuid::new_v4();

        let name = store
            .store_png(id, "data:image/png;base64,aGVsbG8=")
            .await
            .unwrap();
        let written = tokio::fs::read(dir.path().join(&name)).await.unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn rejects_garbage_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let err = store
            .store_png(Uuid::new_v4(), "definitely not base64!!!")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
