use std::env;
use std::time::Duration;

use crate::session::Identity;

/// Client configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub identity_token: Option<String>,
    pub principal: Option<String>,
    pub stale_time: Duration,
    pub request_timeout: Duration,
    pub upload_chunk_size: usize,
    pub blob_cache_capacity: u64,
    pub log_format_json: bool,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let backend_url =
            var("BACKEND_URL").unwrap_or_else(|| "http://localhost:4943".to_string());

        let identity_token = var("IDENTITY_TOKEN").filter(|t| !t.is_empty());
        let principal = var("PRINCIPAL").filter(|p| !p.is_empty());

        let stale_secs = var("QUERY_STALE_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        let timeout_secs = var("REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let upload_chunk_size = var("UPLOAD_CHUNK_SIZE")
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(1024 * 1024);

        let blob_cache_capacity = var("BLOB_CACHE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(64);

        let log_format_json = var("LOG_FORMAT").as_deref() == Some("json");

        Self {
            backend_url,
            identity_token,
            principal,
            stale_time: Duration::from_secs(stale_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            upload_chunk_size,
            blob_cache_capacity,
            log_format_json,
        }
    }

    /// Identity to log in with, if a token was configured
    ///
    /// The principal defaults to `anonymous` when only a token is given.
    pub fn identity(&self) -> Option<Identity> {
        let token = self.identity_token.as_ref()?;
        let principal = self.principal.as_deref().unwrap_or("anonymous");
        Some(Identity::new(principal, token.as_str()))
    }
}
