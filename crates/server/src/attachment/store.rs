//! Local-disk blob storage for uploaded attachments
//!
//! Blobs are keyed by a generated UUID reference; the descriptor a client
//! gets back from the upload endpoint is the only handle to the stored bytes.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use koinonia_shared::ChatError;

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a blob store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ChatError::Storage(format!("failed to create blob dir: {e}")))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a blob, returning its reference
    pub async fn put(&self, bytes: &[u8]) -> Result<String, ChatError> {
        let file_ref = Uuid::new_v4().to_string();
        let path = self.root.join(&file_ref);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ChatError::Storage(format!("failed to write blob: {e}")))?;
        tracing::debug!(file_ref = %file_ref, size = bytes.len(), "Stored blob");
        Ok(file_ref)
    }

    /// Fetch a blob by reference
    pub async fn get(&self, file_ref: &str) -> Result<Vec<u8>, ChatError> {
        let path = self.path_for(file_ref)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ChatError::Storage(format!("blob {file_ref} unreadable: {e}")))
    }

    /// Size in bytes of a stored blob
    pub async fn len(&self, file_ref: &str) -> Result<u64, ChatError> {
        let path = self.path_for(file_ref)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ChatError::Storage(format!("blob {file_ref} missing: {e}")))?;
        Ok(meta.len())
    }

    /// References are UUIDs we handed out; anything else never touches disk
    fn path_for(&self, file_ref: &str) -> Result<PathBuf, ChatError> {
        let id = Uuid::parse_str(file_ref)
            .map_err(|_| ChatError::Storage(format!("invalid blob reference: {file_ref}")))?;
        Ok(self.root.join(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> BlobStore {
        let dir = std::env::temp_dir().join(format!("koinonia-blob-test-{}", Uuid::new_v4()));
        BlobStore::open(dir).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let store = temp_store().await;
        let file_ref = store.put(b"voice note bytes").await.unwrap();

        let bytes = store.get(&file_ref).await.unwrap();
        assert_eq!(bytes, b"voice note bytes");
        assert_eq!(store.len(&file_ref).await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_missing_blob_errors() {
        let store = temp_store().await;
        let missing = Uuid::new_v4().to_string();
        assert!(store.get(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_traversal_reference_rejected() {
        let store = temp_store().await;
        assert!(store.get("../../etc/passwd").await.is_err());
    }
}
