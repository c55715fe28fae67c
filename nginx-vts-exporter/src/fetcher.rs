//! Retrieval of the VTS status document.
//!
//! [`CollectionSource`] is the capability the collector depends on. The
//! production implementation is [`HttpFetcher`]; [`StaticSource`] serves an
//! in-memory body and is used by tests.

use std::future::Future;
use std::time::Duration;

use nginx_vts_common::{ScrapeConfig, StatusDocument};
use parking_lot::RwLock;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::trace;

use crate::config::ConfigError;

/// Reasons a single fetch can fail.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The status page could not be reached or read.
    #[error("Network error: {0}")]
    Network(String),

    /// The status page answered with a non-success HTTP status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The body is not a VTS status document.
    #[error("Failed to decode status document: {0}")]
    Decode(#[from] nginx_vts_common::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

/// Something that can produce a fresh [`StatusDocument`] on demand.
///
/// Each call performs one retrieval with no internal retry. Dropping the
/// returned future abandons the retrieval.
pub trait CollectionSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<StatusDocument, FetchError>> + Send;
}

/// Decode a response body into a status document.
pub fn decode(body: &[u8]) -> Result<StatusDocument, FetchError> {
    Ok(StatusDocument::from_slice(body)?)
}

/// Fetches the status document over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    uri: Url,
}

impl HttpFetcher {
    /// Create a fetcher from scrape settings.
    pub fn new(config: &ScrapeConfig) -> Result<Self, ConfigError> {
        let uri = config
            .parsed_uri()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .user_agent(concat!("nginx-vts-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, uri })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

impl CollectionSource for HttpFetcher {
    async fn fetch(&self) -> Result<StatusDocument, FetchError> {
        trace!(uri = %self.uri, "Fetching status document");

        let response = self.client.get(self.uri.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        trace!(uri = %self.uri, bytes = body.len(), "Fetched status document");

        decode(&body)
    }
}

/// Serves a status document body held in memory.
///
/// The body can be replaced or withdrawn at any time; every fetch decodes
/// the current body into a new document.
#[derive(Debug, Default)]
pub struct StaticSource {
    body: RwLock<Option<Vec<u8>>>,
}

impl StaticSource {
    /// A source that serves `body`.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: RwLock::new(Some(body.into())),
        }
    }

    /// A source whose every fetch fails with a network error.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Replace the served body.
    pub fn set_body(&self, body: impl Into<Vec<u8>>) {
        *self.body.write() = Some(body.into());
    }

    /// Make subsequent fetches fail with a network error.
    pub fn set_unavailable(&self) {
        *self.body.write() = None;
    }
}

impl CollectionSource for StaticSource {
    async fn fetch(&self) -> Result<StatusDocument, FetchError> {
        let body = self.body.read().clone();

        match body {
            Some(body) => decode(&body),
            None => Err(FetchError::Network("status source unavailable".to_string())),
        }
    }
}
