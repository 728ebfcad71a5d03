//! The network fetch service.
//!
//! [`NetworkFetcher`] is the seam between the lifecycle controller and the
//! outside world. A fetch either fails outright (transport error) or yields a
//! [`StoredResponse`] snapshot carrying whatever status the origin returned;
//! non-success statuses are not errors here. No timeout, retry, or circuit
//! breaker is applied: a hung origin hangs the corresponding request.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::http::{RequestKey, StoredResponse};

/// Errors raised when a fetch cannot produce a response at all.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network fetch failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported method {method} for {url}")]
    UnsupportedMethod { method: String, url: String },
}

impl FetchError {
    /// Wrap an underlying transport failure.
    pub fn transport(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

/// Issues a request to the network and snapshots the response.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Fetch the resource named by `key`.
    ///
    /// Returns `Err` only when no response was obtained; an unsuccessful
    /// status code is returned as an ordinary snapshot.
    async fn fetch(&self, key: &RequestKey) -> Result<StoredResponse, FetchError>;
}

/// Production fetcher backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(&self, key: &RequestKey) -> Result<StoredResponse, FetchError> {
        let method: reqwest::Method =
            key.method
                .parse()
                .map_err(|_| FetchError::UnsupportedMethod {
                    method: key.method.clone(),
                    url: key.url.clone(),
                })?;

        let response = self
            .client
            .request(method, key.url.as_str())
            .send()
            .await
            .map_err(|source| FetchError::transport(&key.url, source))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::transport(&key.url, source))?;

        debug!(key = %key, status, bytes = body.len(), "Network fetch complete");

        Ok(StoredResponse::new(status, headers, body))
    }
}
