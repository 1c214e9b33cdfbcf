//! Blob transfer types

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Default upload chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Where the content of a pending blob comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobSource {
    /// Raw bytes that still have to be uploaded
    Bytes(Arc<[u8]>),
    /// Content already stored at a durable remote address
    Remote(Url),
}

/// Immutable reference to committed blob content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    pub id: String,
    pub url: Url,
    pub size: Option<u64>,
    /// Hex SHA-256 of the content, when known
    pub sha256: Option<String>,
}

impl BlobRef {
    /// Reference to content that already lives at `url`
    pub fn remote(url: Url) -> Self {
        Self {
            id: url.to_string(),
            url,
            size: None,
            sha256: None,
        }
    }
}

/// Lifecycle phase of an [`ExternalBlob`](crate::ExternalBlob)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobPhase {
    Pending,
    Committed,
}

/// Server-side handle for one chunked upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_id: String,
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_size: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl UploadOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_upload_options() {
        assert_eq!(UploadOptions::default().chunk_size, 1024 * 1024);
        assert_eq!(UploadOptions::with_chunk_size(0).chunk_size, 1);
    }

    #[test]
    fn test_remote_blob_ref_uses_url_as_id() {
        let url = Url::parse("https://files.example.edu/reports/final.pdf").unwrap();
        let blob = BlobRef::remote(url.clone());
        assert_eq!(blob.id, "https://files.example.edu/reports/final.pdf");
        assert_eq!(blob.url, url);
        assert!(blob.size.is_none());
    }

    #[test]
    fn test_blob_ref_deserialization() {
        let json = r#"{
            "id": "9f86d081",
            "url": "https://blobs.example.edu/blobs/9f86d081",
            "size": 4,
            "sha256": "9f86d081"
        }"#;
        let blob: BlobRef = serde_json::from_str(json).unwrap();
        assert_eq!(blob.id, "9f86d081");
        assert_eq!(blob.size, Some(4));
        assert_eq!(blob.url.path(), "/blobs/9f86d081");
    }
}
