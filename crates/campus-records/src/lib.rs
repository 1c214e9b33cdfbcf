//! Campus Records - remote data sync layer
//!
//! Session-gated access to the campus records backend. Reads are cached per
//! query key and refreshed when a write invalidates their family; project
//! documents are uploaded as external blobs before the project is registered.
//!
//! The layers, bottom up:
//! - [`Backend`]: one async method per remote operation ([`HttpBackend`],
//!   [`MemoryBackend`])
//! - [`SessionGate`]: whether an authenticated identity is available
//! - [`RemoteFacade`]: gate-checked calls with operation-tagged errors
//! - [`CampusClient`]: cached reads and invalidating writes

mod backend;
mod client;
mod config;
mod error;
mod facade;
mod http;
pub mod keys;
mod memory;
mod session;
pub mod stats;
mod types;

pub use backend::{Backend, BackendResult};
pub use client::{CampusClient, RefreshMode, DEFAULT_STALE_TIME};
pub use config::Config;
pub use error::{BackendError, Result, SyncError};
pub use facade::RemoteFacade;
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use session::{Identity, LoginStatus, SessionGate};
pub use types::*;
