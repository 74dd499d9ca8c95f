//! Archive download.

use async_trait::async_trait;
use codeql_env_core::{Error, Result};
use reqwest::Client;
use tracing::debug;

/// Fetches archive bytes from a URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download the resource at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server does not answer
    /// with a success status.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP(S) downloader.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// Create a downloader with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("codeql-env/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "Downloading archive");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::download(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::download(url, format!("Failed to read body: {e}")))
    }
}
