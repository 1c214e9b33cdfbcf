//! In-process blob store

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{BlobError, Result};
use crate::transport::BlobTransport;
use crate::types::{BlobRef, UploadSession};

const MEMORY_BASE_URL: &str = "memory://blobs/";

struct PendingUpload {
    size: u64,
    sha256: String,
    chunks: BTreeMap<u64, Vec<u8>>,
}

#[derive(Default)]
struct Inner {
    blobs: HashMap<String, Arc<Vec<u8>>>,
    uploads: HashMap<String, PendingUpload>,
    next_upload: u64,
}

/// Blob transport that keeps committed content in memory
///
/// Content is addressed by its SHA-256, so uploading identical bytes twice
/// yields the same reference.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed blobs
    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().blobs.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobTransport for MemoryBlobStore {
    async fn begin_upload(&self, size: u64, sha256: &str) -> Result<UploadSession> {
        let mut inner = self.lock();
        inner.next_upload += 1;
        let upload_id = format!("upload-{}", inner.next_upload);
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                size,
                sha256: sha256.to_string(),
                chunks: BTreeMap::new(),
            },
        );
        Ok(UploadSession { upload_id })
    }

    async fn put_chunk(&self, session: &UploadSession, index: u64, chunk: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        let upload = inner
            .uploads
            .get_mut(&session.upload_id)
            .ok_or_else(|| BlobError::Upload(format!("unknown upload {}", session.upload_id)))?;
        upload.chunks.insert(index, chunk.to_vec());
        Ok(())
    }

    async fn finish_upload(&self, session: &UploadSession) -> Result<BlobRef> {
        let mut inner = self.lock();
        let upload = inner
            .uploads
            .remove(&session.upload_id)
            .ok_or_else(|| BlobError::Upload(format!("unknown upload {}", session.upload_id)))?;

        let content: Vec<u8> = upload.chunks.into_values().flatten().collect();
        if content.len() as u64 != upload.size {
            return Err(BlobError::Upload(format!(
                "expected {} bytes, received {}",
                upload.size,
                content.len()
            )));
        }
        let digest = hex::encode(Sha256::digest(&content));
        if digest != upload.sha256 {
            return Err(BlobError::Upload("content digest mismatch".to_string()));
        }

        let url = Url::parse(MEMORY_BASE_URL)?.join(&digest)?;
        inner.blobs.insert(digest.clone(), Arc::new(content));
        Ok(BlobRef {
            id: digest.clone(),
            url,
            size: Some(upload.size),
            sha256: Some(digest),
        })
    }

    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        self.lock()
            .blobs
            .get(&blob.id)
            .map(|content| content.as_ref().clone())
            .ok_or_else(|| BlobError::NotFound(blob.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_are_reassembled_in_order() {
        let store = MemoryBlobStore::new();
        let content = b"hello world".to_vec();
        let digest = hex::encode(Sha256::digest(&content));

        let session = store.begin_upload(11, &digest).await.unwrap();
        store.put_chunk(&session, 1, b" world").await.unwrap();
        store.put_chunk(&session, 0, b"hello").await.unwrap();
        let blob = store.finish_upload(&session).await.unwrap();

        assert_eq!(blob.id, digest);
        assert_eq!(blob.url.as_str(), format!("memory://blobs/{}", digest));
        assert_eq!(store.fetch(&blob).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_digest_mismatch_is_rejected() {
        let store = MemoryBlobStore::new();
        let session = store.begin_upload(3, "deadbeef").await.unwrap();
        store.put_chunk(&session, 0, b"abc").await.unwrap();

        let err = store.finish_upload(&session).await.unwrap_err();
        assert!(matches!(err, BlobError::Upload(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_blob_is_not_found() {
        let store = MemoryBlobStore::new();
        let blob = BlobRef::remote(Url::parse("memory://blobs/missing").unwrap());
        assert!(matches!(
            store.fetch(&blob).await,
            Err(BlobError::NotFound(_))
        ));
    }
}
