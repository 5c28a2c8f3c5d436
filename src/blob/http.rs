//! Blob store client over HTTP
//!
//! - `PUT {base}/blob/{name}` with the raw bytes, answered with `{id}` or `{file_id}`
//! - `GET {base}/blob/{id}` for the bytes
//! - `GET {base}/shares/{base64url(url)}` resolving a sharing URL to `{id}`

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::BlobStore;
use crate::types::{FieldOpsError, Result};

#[derive(Debug, Deserialize)]
struct StoredFile {
    #[serde(alias = "file_id")]
    id: String,
}

/// reqwest-backed blob store. No retries: a failure surfaces immediately.
pub struct HttpBlobStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("fieldops/0.1")
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Sharing URLs travel as unpadded base64url path segments
fn encode_share(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, data: Bytes, name: &str) -> Result<String> {
        let url = self.url(&format!("/blob/{}", urlencoding::encode(name)));
        let size = data.len();

        let response = self
            .http_client
            .put(&url)
            .header("content-type", "application/octet-stream")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(name = %name, status = %response.status(), "Blob upload rejected");
            return Err(FieldOpsError::Storage(format!(
                "Storage returned {}",
                response.status()
            )));
        }

        let stored: StoredFile = response.json().await?;
        debug!(name = %name, bytes = size, file_id = %stored.id, "Blob uploaded");
        Ok(stored.id)
    }

    async fn download(&self, file_id: &str) -> Result<Bytes> {
        let url = self.url(&format!("/blob/{}", urlencoding::encode(file_id)));
        let response = self.http_client.get(&url).send().await?;

        match response.status() {
            s if s.is_success() => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(FieldOpsError::NotFound("Image not found".into())),
            s => Err(FieldOpsError::Storage(format!("Storage returned {}", s))),
        }
    }

    async fn resolve(&self, sharing_url: &str) -> Result<String> {
        let url = self.url(&format!("/shares/{}", encode_share(sharing_url)));
        let response = self.http_client.get(&url).send().await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<StoredFile>().await?.id),
            StatusCode::NOT_FOUND => Err(FieldOpsError::NotFound("Image not found".into())),
            s => Err(FieldOpsError::Storage(format!("Storage returned {}", s))),
        }
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let store = HttpBlobStore::new("http://storage:8091/");
        assert_eq!(store.url("/blob/x"), "http://storage:8091/blob/x");
    }

    #[test]
    fn test_share_encoding_is_path_safe() {
        let encoded = encode_share("https://contoso.sharepoint.com/:i:/g/abc?e=1");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_stored_file_accepts_both_keys() {
        let a: StoredFile = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        let b: StoredFile = serde_json::from_str(r#"{"file_id":"def"}"#).unwrap();
        assert_eq!(a.id, "abc");
        assert_eq!(b.id, "def");
    }
}
