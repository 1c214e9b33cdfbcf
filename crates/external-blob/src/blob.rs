//! Blob payload state machine

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BlobError, Result};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::transport::BlobTransport;
use crate::types::{BlobPhase, BlobRef, BlobSource, UploadOptions};

enum BlobState {
    Pending {
        source: BlobSource,
        progress: Option<Arc<dyn ProgressSink>>,
    },
    Committed(BlobRef),
}

/// A binary payload that is either pending upload or committed
///
/// Committing consumes the value, so a pending payload can be uploaded at most
/// once; build a fresh one for every attempt.
pub struct ExternalBlob {
    state: BlobState,
}

impl ExternalBlob {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            state: BlobState::Pending {
                source: BlobSource::Bytes(bytes.into()),
                progress: None,
            },
        }
    }

    /// Payload whose content already lives at `url`
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        Ok(Self {
            state: BlobState::Pending {
                source: BlobSource::Remote(url),
                progress: None,
            },
        })
    }

    /// Wrap a reference returned by a backend
    pub fn committed(blob: BlobRef) -> Self {
        Self {
            state: BlobState::Committed(blob),
        }
    }

    /// Return a payload that reports upload progress to `sink`
    ///
    /// Committed payloads have nothing left to upload and are returned as is.
    pub fn with_upload_progress(self, sink: impl ProgressSink + 'static) -> Self {
        match self.state {
            BlobState::Pending { source, .. } => Self {
                state: BlobState::Pending {
                    source,
                    progress: Some(Arc::new(sink)),
                },
            },
            committed => Self { state: committed },
        }
    }

    pub fn phase(&self) -> BlobPhase {
        match self.state {
            BlobState::Pending { .. } => BlobPhase::Pending,
            BlobState::Committed(_) => BlobPhase::Committed,
        }
    }

    pub fn source(&self) -> Option<&BlobSource> {
        match &self.state {
            BlobState::Pending { source, .. } => Some(source),
            BlobState::Committed(_) => None,
        }
    }

    pub fn blob_ref(&self) -> Result<&BlobRef> {
        match &self.state {
            BlobState::Committed(blob) => Ok(blob),
            BlobState::Pending { .. } => Err(not_committed()),
        }
    }

    /// Stable address of the committed content
    pub fn direct_url(&self) -> Result<&Url> {
        self.blob_ref().map(|blob| &blob.url)
    }

    /// Download the committed content through `transport`
    pub async fn get_bytes(&self, transport: &dyn BlobTransport) -> Result<Vec<u8>> {
        let blob = self.blob_ref()?;
        transport.fetch(blob).await
    }

    /// Upload pending bytes (or adopt a remote reference) and return the
    /// committed reference
    pub async fn commit(
        self,
        transport: &dyn BlobTransport,
        options: &UploadOptions,
    ) -> Result<BlobRef> {
        match self.state {
            BlobState::Committed(blob) => Ok(blob),
            BlobState::Pending {
                source: BlobSource::Remote(url),
                progress,
            } => {
                let mut reporter = ProgressReporter::new(progress);
                reporter.finish();
                debug!(url = %url, "Adopted remote blob reference");
                Ok(BlobRef::remote(url))
            }
            BlobState::Pending {
                source: BlobSource::Bytes(bytes),
                progress,
            } => {
                let mut reporter = ProgressReporter::new(progress);
                match upload(&bytes, transport, options, &mut reporter).await {
                    Ok(blob) => {
                        reporter.finish();
                        info!(id = %blob.id, size = bytes.len(), "Blob upload committed");
                        Ok(blob)
                    }
                    Err(err) => {
                        reporter.fail();
                        warn!(
                            error = %err,
                            last_progress = ?reporter.last(),
                            "Blob upload failed"
                        );
                        Err(match err {
                            BlobError::Upload(msg) => BlobError::Upload(msg),
                            other => BlobError::Upload(other.to_string()),
                        })
                    }
                }
            }
        }
    }
}

async fn upload(
    bytes: &[u8],
    transport: &dyn BlobTransport,
    options: &UploadOptions,
    reporter: &mut ProgressReporter,
) -> Result<BlobRef> {
    let total = bytes.len() as u64;
    let digest = hex::encode(Sha256::digest(bytes));
    let chunk_size = options.chunk_size.max(1);

    reporter.start();
    let session = transport.begin_upload(total, &digest).await?;
    debug!(upload_id = %session.upload_id, size = total, "Blob upload started");

    let mut sent = 0u64;
    for (index, chunk) in bytes.chunks(chunk_size).enumerate() {
        transport.put_chunk(&session, index as u64, chunk).await?;
        sent += chunk.len() as u64;
        reporter.advance(sent, total);
    }

    transport.finish_upload(&session).await
}

fn not_committed() -> BlobError {
    BlobError::InvalidState("blob has not been committed".to_string())
}

impl fmt::Debug for ExternalBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            BlobState::Pending {
                source: BlobSource::Bytes(bytes),
                progress,
            } => f
                .debug_struct("ExternalBlob::Pending")
                .field("bytes", &bytes.len())
                .field("progress", &progress.is_some())
                .finish(),
            BlobState::Pending {
                source: BlobSource::Remote(url),
                progress,
            } => f
                .debug_struct("ExternalBlob::Pending")
                .field("url", &url.as_str())
                .field("progress", &progress.is_some())
                .finish(),
            BlobState::Committed(blob) => f
                .debug_tuple("ExternalBlob::Committed")
                .field(blob)
                .finish(),
        }
    }
}
