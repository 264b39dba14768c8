//! Reading references that are not part of the in-memory bundle

use crate::uri;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("network access disabled for {0}")]
    Offline(String),
}

/// Reads external locators: `http(s)` URLs over HTTP, anything else from disk
#[derive(Debug, Clone)]
pub struct ExternalFetcher {
    client: Option<reqwest::Client>,
}

impl ExternalFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client: Some(client),
        })
    }

    /// Filesystem only; HTTP locators fail with [`FetchError::Offline`]
    pub fn local_only() -> Self {
        Self { client: None }
    }

    pub async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        if uri::is_http(locator) {
            return self.fetch_http(locator).await;
        }
        let path = PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Read external resource");
        Ok(bytes)
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::Offline(url.to_string()))?;
        info!(url = %url, "Fetching remote resource");
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        debug!(url = %url, bytes = bytes.len(), "Fetched remote resource");
        Ok(bytes.to_vec())
    }
}
