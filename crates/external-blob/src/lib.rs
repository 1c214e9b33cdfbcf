//! External blob payloads
//!
//! An [`ExternalBlob`] is either raw bytes waiting to be uploaded or a reference
//! to content that already lives at a remote URL. Committing it through a
//! [`BlobTransport`] yields an immutable [`BlobRef`] that can be dereferenced
//! with [`ExternalBlob::direct_url`] or fetched with [`ExternalBlob::get_bytes`].
//!
//! ```no_run
//! use external_blob::{ExternalBlob, MemoryBlobStore, UploadOptions};
//!
//! # async fn example() -> external_blob::Result<()> {
//! let store = MemoryBlobStore::new();
//! let blob = ExternalBlob::from_bytes(b"%PDF-1.7".to_vec())
//!     .with_upload_progress(|pct: u8| println!("{pct}%"));
//! let committed = blob.commit(&store, &UploadOptions::default()).await?;
//! println!("stored at {}", committed.url);
//! # Ok(())
//! # }
//! ```

mod blob;
mod error;
mod http;
mod memory;
mod progress;
mod transport;
mod types;

pub use blob::ExternalBlob;
pub use error::{BlobError, Result};
pub use http::HttpBlobTransport;
pub use memory::MemoryBlobStore;
pub use progress::{ProgressChannel, ProgressReporter, ProgressSink};
pub use transport::BlobTransport;
pub use types::{BlobPhase, BlobRef, BlobSource, UploadOptions, UploadSession};
