//! Error types for the campus records data layer

use std::fmt;
use std::sync::Arc;

use external_blob::BlobError;
use query_cache::QueryError;

/// Failure reported by a backend transport
#[derive(Debug)]
pub enum BackendError {
    Http(Box<reqwest::Error>),
    /// Non-success HTTP status with the response body
    Status { code: u16, body: String },
    /// The backend rejected the call (trap, authorization, validation)
    Rejected(String),
    Decode(String),
    InvalidUrl(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Http(err) => write!(f, "HTTP error: {}", err),
            BackendError::Status { code, body } if body.is_empty() => {
                write!(f, "Backend returned status {}", code)
            }
            BackendError::Status { code, body } => {
                write!(f, "Backend returned status {}: {}", code, body)
            }
            BackendError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            BackendError::Decode(msg) => write!(f, "Decode error: {}", msg),
            BackendError::InvalidUrl(msg) => write!(f, "Invalid backend URL: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(Box::new(err))
    }
}

impl From<url::ParseError> for BackendError {
    fn from(err: url::ParseError) -> Self {
        BackendError::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Errors surfaced to callers of the data layer
///
/// Cloneable so a single failed fetch can be handed to every caller waiting
/// on it.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// A call was attempted while no session is ready
    NotReady,
    /// A backend operation failed
    Remote {
        op: &'static str,
        cause: Arc<BackendError>,
    },
    Upload(String),
    InvalidState(String),
    Cache(QueryError),
    Config(String),
}

impl SyncError {
    pub fn remote(op: &'static str, cause: BackendError) -> Self {
        SyncError::Remote {
            op,
            cause: Arc::new(cause),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotReady => write!(f, "Session is not ready"),
            SyncError::Remote { op, cause } => write!(f, "Remote call {} failed: {}", op, cause),
            SyncError::Upload(msg) => write!(f, "Upload failed: {}", msg),
            SyncError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            SyncError::Cache(err) => write!(f, "Cache error: {}", err),
            SyncError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Remote { cause, .. } => Some(cause.as_ref()),
            SyncError::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueryError> for SyncError {
    fn from(err: QueryError) -> Self {
        SyncError::Cache(err)
    }
}

impl From<BlobError> for SyncError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidState(msg) => SyncError::InvalidState(msg),
            BlobError::Upload(msg) => SyncError::Upload(msg),
            other => SyncError::Upload(other.to_string()),
        }
    }
}

impl From<tracing_subscriber::filter::ParseError> for SyncError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_display() {
        assert_eq!(format!("{}", SyncError::NotReady), "Session is not ready");
    }

    #[test]
    fn test_remote_error_display() {
        let err = SyncError::remote(
            "getAllStudents",
            BackendError::Status {
                code: 503,
                body: String::new(),
            },
        );
        assert_eq!(
            format!("{}", err),
            "Remote call getAllStudents failed: Backend returned status 503"
        );
    }

    #[test]
    fn test_remote_error_exposes_cause() {
        use std::error::Error;

        let err = SyncError::remote("addGrade", BackendError::Rejected("Unauthorized".into()));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Rejected: Unauthorized"));
    }

    #[test]
    fn test_blob_errors_convert() {
        let err: SyncError = BlobError::InvalidState("not committed".into()).into();
        assert!(matches!(err, SyncError::InvalidState(_)));

        let err: SyncError = BlobError::Status(500).into();
        assert!(matches!(err, SyncError::Upload(msg) if msg.contains("500")));
    }
}
