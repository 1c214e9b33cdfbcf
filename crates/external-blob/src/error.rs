//! Error types for blob transfer

use std::fmt;

#[derive(Debug)]
pub enum BlobError {
    /// Transport failure while uploading; the payload must be discarded
    Upload(String),
    /// Operation invoked outside the state it is valid in
    InvalidState(String),
    InvalidUrl(String),
    NotFound(String),
    Http(Box<reqwest::Error>),
    Status(u16),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::Upload(msg) => write!(f, "Upload failed: {}", msg),
            BlobError::InvalidState(msg) => write!(f, "Invalid blob state: {}", msg),
            BlobError::InvalidUrl(msg) => write!(f, "Invalid blob URL: {}", msg),
            BlobError::NotFound(id) => write!(f, "Blob not found: {}", id),
            BlobError::Http(err) => write!(f, "HTTP error: {}", err),
            BlobError::Status(code) => write!(f, "Blob store returned status {}", code),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        BlobError::Http(Box::new(err))
    }
}

impl From<url::ParseError> for BlobError {
    fn from(err: url::ParseError) -> Self {
        BlobError::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BlobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_display() {
        let err = BlobError::Upload("connection reset".to_string());
        assert_eq!(format!("{}", err), "Upload failed: connection reset");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = BlobError::InvalidState("blob is not committed".to_string());
        assert_eq!(
            format!("{}", err),
            "Invalid blob state: blob is not committed"
        );
    }

    #[test]
    fn test_url_parse_error_converts() {
        let err: BlobError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, BlobError::InvalidUrl(_)));
    }
}
