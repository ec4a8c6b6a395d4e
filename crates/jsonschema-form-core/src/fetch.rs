//! Fetcher capability for external schema documents.
//!
//! The core never performs I/O directly; it awaits a [`SchemaFetcher`]
//! supplied by the host. [`HttpFetcher`] is the default implementation
//! backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Why a fetch failed. Each cause is distinguishable so callers can
/// report it, but all of them are cached the same way.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("response is not valid JSON: {0}")]
    Parse(String),
}

/// Fetch a JSON document by absolute URI.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Value, FetchError>;
}

/// [`SchemaFetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SchemaFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<Value, FetchError> {
        tracing::debug!(%uri, "fetching schema document");
        let response = self
            .client
            .get(uri)
            .header(reqwest::header::ACCEPT, "application/schema+json, application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        parse_body(&body)
    }
}

/// Decode a response body. Transport failures never reach here, so every
/// error is a [`FetchError::Parse`].
fn parse_body(body: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))
}
