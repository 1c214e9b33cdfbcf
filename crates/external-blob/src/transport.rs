//! Upload transport seam

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BlobRef, UploadSession};

/// Moves blob content to and from durable storage
///
/// Uploads are chunked: `begin_upload`, then one `put_chunk` per chunk in
/// order, then `finish_upload` which commits the content and returns its
/// stable reference.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Open an upload for `size` bytes whose hex SHA-256 is `sha256`
    async fn begin_upload(&self, size: u64, sha256: &str) -> Result<UploadSession>;

    async fn put_chunk(&self, session: &UploadSession, index: u64, chunk: &[u8]) -> Result<()>;

    async fn finish_upload(&self, session: &UploadSession) -> Result<BlobRef>;

    /// Download committed content
    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>>;
}
