//! Blob storage for uploaded documents
//!
//! Backends:
//! - `HttpBlobStore`: Vercel Blob compatible `PUT {api_base}/{pathname}`
//! - `FsBlobStore`: local directory, served by the gateway under `/files`
//! - `MemoryBlobStore`: in-process map for tests

use crate::config::BlobConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Descriptor of a stored blob, returned to upload clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub url: String,
    pub pathname: String,
    pub content_type: String,
    pub size: usize,
}

/// Ownership metadata attached to an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
}

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name derived from `pathname`; never overwrites
    async fn put(
        &self,
        pathname: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<StoredBlob>;

    fn provider(&self) -> &str;
}

/// Sanitize a filename and add a random suffix before the extension.
///
/// `notes/week 1.pdf` becomes something like `week_1-a8Xk2P0q.pdf`.
pub fn blob_pathname(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    let clean = if clean.is_empty() { "file" } else { clean };

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    match clean.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}-{}.{}", stem, suffix, ext)
        }
        _ => format!("{}-{}", clean, suffix),
    }
}

fn blob_error(message: impl Into<String>) -> AppError {
    AppError::BlobStoreError {
        message: message.into(),
    }
}

// ============================================================================
// HTTP (Vercel Blob compatible)
// ============================================================================

pub struct HttpBlobStore {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutResponse {
    url: String,
    pathname: String,
    content_type: Option<String>,
}

impl HttpBlobStore {
    pub fn new(config: &BlobConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "blob.token is required for the http blob provider".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<StoredBlob> {
        let size = bytes.len();
        let response = self
            .client
            .put(format!("{}/{}", self.api_base, blob_pathname(pathname)))
            .bearer_auth(&self.token)
            .header("x-api-version", "7")
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .body(bytes)
            .send()
            .await
            .map_err(|e| blob_error(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(blob_error(format!("Upload returned {}: {}", status, body)));
        }

        let stored: PutResponse = response
            .json()
            .await
            .map_err(|e| blob_error(format!("Failed to parse upload response: {}", e)))?;

        debug!(
            document_id = %metadata.document_id,
            url = %stored.url,
            "Blob stored"
        );

        Ok(StoredBlob {
            url: stored.url,
            pathname: stored.pathname,
            content_type: stored
                .content_type
                .unwrap_or_else(|| content_type.to_string()),
            size,
        })
    }

    fn provider(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Local filesystem
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar<'a> {
    #[serde(flatten)]
    metadata: &'a BlobMetadata,
    content_type: &'a str,
    size: usize,
    sha256: String,
}

pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<StoredBlob> {
        let stored_name = blob_pathname(pathname);
        let path = self.root.join(&stored_name);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| blob_error(format!("Failed to create blob dir: {}", e)))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| blob_error(format!("Failed to write {}: {}", path.display(), e)))?;

        let sidecar = Sidecar {
            metadata,
            content_type,
            size: bytes.len(),
            sha256: hex::encode(Sha256::digest(&bytes)),
        };
        tokio::fs::write(
            self.root.join(format!("{}.meta.json", stored_name)),
            serde_json::to_vec_pretty(&sidecar)?,
        )
        .await
        .map_err(|e| blob_error(format!("Failed to write metadata: {}", e)))?;

        Ok(StoredBlob {
            url: format!("{}/{}", self.public_base_url, stored_name),
            pathname: stored_name,
            content_type: content_type.to_string(),
            size: bytes.len(),
        })
    }

    fn provider(&self) -> &str {
        "fs"
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, (Bytes, BlobMetadata)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored blob by pathname
    pub async fn get(&self, pathname: &str) -> Option<(Bytes, BlobMetadata)> {
        self.blobs.read().await.get(pathname).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        pathname: &str,
        bytes: Bytes,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<StoredBlob> {
        let stored_name = blob_pathname(pathname);
        let size = bytes.len();
        self.blobs
            .write()
            .await
            .insert(stored_name.clone(), (bytes, metadata.clone()));

        Ok(StoredBlob {
            url: format!("memory://{}", stored_name),
            pathname: stored_name,
            content_type: content_type.to_string(),
            size,
        })
    }

    fn provider(&self) -> &str {
        "memory"
    }
}

/// Create a blob store based on configuration
pub fn create_blob_store(config: &BlobConfig) -> Result<Arc<dyn BlobStore>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpBlobStore::new(config)?)),
        "fs" => Ok(Arc::new(FsBlobStore::new(
            &config.local_dir,
            &config.public_base_url,
        ))),
        "memory" => Ok(Arc::new(MemoryBlobStore::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown blob provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> BlobMetadata {
        BlobMetadata {
            document_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_pathname_keeps_extension_and_is_unique() {
        let a = blob_pathname("lecture 01.pdf");
        let b = blob_pathname("lecture 01.pdf");
        assert!(a.starts_with("lecture_01-"));
        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_pathname_strips_directories() {
        let name = blob_pathname("../../etc/passwd");
        assert!(name.starts_with("passwd-"));
        assert!(!name.contains('/'));

        let dotfile = blob_pathname(".env");
        assert!(dotfile.starts_with("env-"));
    }

    #[tokio::test]
    async fn test_fs_store_writes_file_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost:8080/files/");

        let blob = store
            .put(
                "notes.txt",
                Bytes::from_static(b"hello"),
                "text/plain",
                &metadata(),
            )
            .await
            .unwrap();

        assert_eq!(blob.size, 5);
        assert_eq!(
            blob.url,
            format!("http://localhost:8080/files/{}", blob.pathname)
        );
        let written = tokio::fs::read(dir.path().join(&blob.pathname)).await.unwrap();
        assert_eq!(written, b"hello");
        assert!(dir
            .path()
            .join(format!("{}.meta.json", blob.pathname))
            .exists());
    }

    #[tokio::test]
    async fn test_memory_store_never_overwrites() {
        let store = MemoryBlobStore::new();
        let meta = metadata();
        let first = store
            .put("a.pdf", Bytes::from_static(b"1"), "application/pdf", &meta)
            .await
            .unwrap();
        let second = store
            .put("a.pdf", Bytes::from_static(b"2"), "application/pdf", &meta)
            .await
            .unwrap();

        assert_ne!(first.pathname, second.pathname);
        assert_eq!(store.len().await, 2);
        let (bytes, stored_meta) = store.get(&first.pathname).await.unwrap();
        assert_eq!(&bytes[..], b"1");
        assert_eq!(stored_meta, meta);
    }

    #[test]
    fn test_http_store_requires_token() {
        let config = BlobConfig::default();
        assert!(matches!(
            HttpBlobStore::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
