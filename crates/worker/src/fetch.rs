//! Downloading uploaded documents

use crate::errors::WorkerError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Source of document bytes, addressed by the blob URL
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkerError>;
}

/// Fetches `http(s)://` blob URLs with reqwest. Local paths are never read.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WorkerError::Download {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

fn download_error(url: &str, message: impl ToString) -> WorkerError {
    WorkerError::Download {
        url: url.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkerError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(download_error(url, "unsupported URL scheme"));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(url, format!("server returned {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(url, e))?;
        debug!(url, size = bytes.len(), "Document downloaded");

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_http_urls_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"lecture notes").await.unwrap();

        let fetcher = HttpFetcher::new(5).unwrap();
        for url in [
            format!("file://{}", path.display()),
            "file:///etc/passwd".to_string(),
            "memory://notes-abc.txt".to_string(),
            path.display().to_string(),
        ] {
            assert!(
                matches!(fetcher.fetch(&url).await, Err(WorkerError::Download { .. })),
                "{} should be refused",
                url
            );
        }
    }
}
