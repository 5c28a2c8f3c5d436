//! Blob storage for audit photos
//!
//! Uploads are best-effort: callers record a failed upload as a sentinel
//! string instead of failing the audit.

mod http;

pub use http::HttpBlobStore;

use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{FieldOpsError, Result};

/// Opaque file store keyed by file id
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a suggested name and return the file id
    async fn upload(&self, data: Bytes, name: &str) -> Result<String>;

    /// Fetch bytes by file id; `NotFound` when absent
    async fn download(&self, file_id: &str) -> Result<Bytes>;

    /// Turn a sharing URL into a file id
    async fn resolve(&self, sharing_url: &str) -> Result<String>;

    /// Short name for health output
    fn backend(&self) -> &'static str;
}

/// In-memory blob store (for testing/local development)
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Bytes, name: &str) -> Result<String> {
        let id = format!("{}-{}", uuid::Uuid::new_v4().simple(), name);
        self.blobs.write().await.insert(id.clone(), data);
        Ok(id)
    }

    async fn download(&self, file_id: &str) -> Result<Bytes> {
        self.blobs
            .read()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| FieldOpsError::NotFound("Image not found".into()))
    }

    async fn resolve(&self, sharing_url: &str) -> Result<String> {
        // Ids double as sharing URLs here
        if self.blobs.read().await.contains_key(sharing_url) {
            Ok(sharing_url.to_string())
        } else {
            Err(FieldOpsError::NotFound("Image not found".into()))
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Store used when no STORAGE_URL is configured outside dev mode
pub struct UnavailableBlobStore;

#[async_trait::async_trait]
impl BlobStore for UnavailableBlobStore {
    async fn upload(&self, _data: Bytes, _name: &str) -> Result<String> {
        Err(FieldOpsError::Storage("Blob storage is not configured".into()))
    }

    async fn download(&self, _file_id: &str) -> Result<Bytes> {
        Err(FieldOpsError::Storage("Blob storage is not configured".into()))
    }

    async fn resolve(&self, _sharing_url: &str) -> Result<String> {
        Err(FieldOpsError::Storage("Blob storage is not configured".into()))
    }

    fn backend(&self) -> &'static str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryBlobStore::new();
        let id = store.upload(Bytes::from_static(b"jpeg"), "start.jpg").await.unwrap();
        assert!(id.ends_with("start.jpg"));
        assert_eq!(store.download(&id).await.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(store.resolve(&id).await.unwrap(), id);
        assert_eq!(store.download("missing").await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_uploads() {
        let err = UnavailableBlobStore
            .upload(Bytes::from_static(b"x"), "a.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, FieldOpsError::Storage(_)));
    }
}
