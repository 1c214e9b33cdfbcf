//! HTTP blob transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{BlobError, Result};
use crate::transport::BlobTransport;
use crate::types::{BlobRef, UploadSession};

const DEFAULT_CACHE_CAPACITY: u64 = 64;
const CACHE_TTL_SECS: u64 = 600; // 10 minutes

#[derive(Debug, Serialize)]
struct BeginUploadRequest<'a> {
    size: u64,
    sha256: &'a str,
}

/// Uploads blobs to an HTTP blob store and downloads committed content
///
/// Endpoints, relative to the base URL:
/// - `POST blobs/uploads` with `{size, sha256}` returns an [`UploadSession`]
/// - `PUT blobs/uploads/{id}/chunks/{index}` with the raw chunk
/// - `POST blobs/uploads/{id}/commit` returns the [`BlobRef`]
///
/// Downloads go to the reference's own URL and are kept in a small in-memory
/// cache keyed by blob id.
pub struct HttpBlobTransport {
    client: Client,
    base_url: Url,
    token: Option<String>,
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl HttpBlobTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Self::with_client(client, base_url, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_client(client: Client, base_url: &str, cache_capacity: u64) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let cache = Cache::builder()
            .max_capacity(cache_capacity)
            .time_to_live(Duration::from_secs(CACHE_TTL_SECS))
            .build();

        Ok(Self {
            client,
            base_url,
            token: None,
            cache,
        })
    }

    /// Send `token` as a bearer credential on every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn upload_url(&self, session: &UploadSession, tail: &str) -> Result<Url> {
        let path = format!(
            "blobs/uploads/{}/{}",
            urlencoding::encode(&session.upload_id),
            tail
        );
        Ok(self.base_url.join(&path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Whether `url` is served by the blob store itself (same scheme, host
    /// and port as the base URL)
    fn is_own_origin(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
    }
}

#[async_trait]
impl BlobTransport for HttpBlobTransport {
    async fn begin_upload(&self, size: u64, sha256: &str) -> Result<UploadSession> {
        let url = self.base_url.join("blobs/uploads")?;
        let response = self
            .authorize(self.client.post(url))
            .json(&BeginUploadRequest { size, sha256 })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BlobError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn put_chunk(&self, session: &UploadSession, index: u64, chunk: &[u8]) -> Result<()> {
        let url = self.upload_url(session, &format!("chunks/{}", index))?;
        let response = self
            .authorize(self.client.put(url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(
                upload_id = %session.upload_id,
                index,
                status = %response.status(),
                "Chunk upload rejected"
            );
            return Err(BlobError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn finish_upload(&self, session: &UploadSession) -> Result<BlobRef> {
        let url = self.upload_url(session, "commit")?;
        let response = self.authorize(self.client.post(url)).send().await?;

        if !response.status().is_success() {
            return Err(BlobError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        if let Some(cached) = self.cache.get(&blob.id).await {
            debug!(id = %blob.id, "Blob cache hit");
            return Ok(cached.as_ref().clone());
        }

        // remote references may point anywhere; only the store gets the token
        let request = self.client.get(blob.url.clone());
        let request = if self.is_own_origin(&blob.url) {
            self.authorize(request)
        } else {
            request
        };
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(blob.id.clone()));
        }
        if !response.status().is_success() {
            return Err(BlobError::Status(response.status().as_u16()));
        }

        let data = response.bytes().await?.to_vec();
        debug!(id = %blob.id, size = data.len(), "Fetched blob");
        self.cache
            .insert(blob.id.clone(), Arc::new(data.clone()))
            .await;
        Ok(data)
    }
}
