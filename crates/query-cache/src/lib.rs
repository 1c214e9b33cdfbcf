//! Keyed query cache with tag-based invalidation
//!
//! Caches the results of async fetches under structured [`QueryKey`]s. Entries
//! go stale after a per-query freshness window or when a mutation invalidates
//! the key family they belong to. Concurrent queries for the same key share a
//! single in-flight fetch.

mod cache;
mod error;
mod key;
mod types;

pub use cache::QueryCache;
pub use error::{QueryError, Result};
pub use key::{InvalidationTag, KeyPart, QueryKey};
pub use types::{CacheStats, EntryState};
