//! Error types for the query cache

use std::fmt;

use crate::key::QueryKey;

/// Failures raised by the cache itself rather than by a fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The key holds a value (or in-flight fetch) of a different type
    TypeMismatch { key: QueryKey },
    /// The spawned fetch task ended without producing a result
    FetchAborted { key: QueryKey, reason: String },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::TypeMismatch { key } => {
                write!(f, "Cached value for {} has a different type", key)
            }
            QueryError::FetchAborted { key, reason } => {
                write!(f, "Fetch for {} aborted: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for QueryError {}

pub type Result<T> = std::result::Result<T, QueryError>;
