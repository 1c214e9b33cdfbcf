//! Cache types

use std::time::Duration;

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub invalidations: u64,
}

/// Point-in-time view of one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    pub has_value: bool,
    /// Stale relative to the freshness window the value was stored with
    pub stale: bool,
    pub in_flight: bool,
    /// Time since the value was fetched; `None` when no value is held
    pub age: Option<Duration>,
}
