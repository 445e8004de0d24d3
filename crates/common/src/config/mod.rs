//! Configuration management for Cognify services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Relational store configuration
    pub database: DatabaseConfig,

    /// Session token configuration
    pub auth: AuthConfig,

    /// Embedding API configuration
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    pub vector_index: VectorIndexConfig,

    /// Generative text API configuration
    pub generation: GenerationConfig,

    /// Blob store configuration
    pub blob: BlobConfig,

    /// Document worker configuration
    pub worker: WorkerConfig,

    /// Retrieval pipeline tuning
    pub rag: RagConfig,

    /// Upload limits
    pub upload: UploadConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (postgres:// or sqlite:)
    pub url: String,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Minimum number of connections
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,

    /// Create missing tables on startup
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret used to sign session tokens
    pub jwt_secret: String,

    /// Session token lifetime in seconds
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, huggingface, mock
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    pub model: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum attempts per request
    pub max_retries: u32,

    /// Batch size for embedding requests
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    /// Index provider: pinecone, pgvector, memory
    pub provider: String,

    /// Pinecone API key
    pub api_key: Option<String>,

    /// Pinecone index host, e.g. https://cognify-documents-abc123.svc.pinecone.io
    pub host: Option<String>,

    /// Pinecone namespace
    pub namespace: Option<String>,

    /// pgvector table name
    pub table: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Generation provider: gemini, openai, mock
    pub provider: String,

    /// API key for the generation service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum output tokens
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Blob provider: http, fs, memory
    pub provider: String,

    /// Object store API base URL (http provider)
    pub api_base: String,

    /// Object store read-write token (http provider)
    pub token: Option<String>,

    /// Root directory for stored files (fs provider)
    pub local_dir: String,

    /// Public URL prefix for stored files (fs provider)
    pub public_base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL of the document worker; dispatch is skipped when unset
    pub url: Option<String>,

    /// Dispatch timeout in seconds
    pub timeout_secs: u64,

    /// Port the worker service listens on
    pub port: u16,

    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Download timeout in seconds
    pub download_timeout_secs: u64,

    /// Prometheus exporter port of the worker process (0 to disable)
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RagConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum upload size in bytes
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (debug, info, cognify_gateway=debug, ...)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Prometheus exporter port of the gateway (0 to disable)
    pub metrics_port: u16,

    /// Service name attached to startup logs
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    pub requests_per_second: u32,

    /// Burst capacity
    pub burst: u32,

    /// Enable rate limiting
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/cognify".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
            auto_migrate: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiration_secs: 60 * 60 * 24 * 30,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            api_base: None,
            model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
            timeout_secs: 30,
            max_retries: 3,
            batch_size: 100,
        }
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: "pinecone".to_string(),
            api_key: None,
            host: None,
            namespace: None,
            table: "document_chunks".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            api_key: None,
            api_base: None,
            model: "gemini-pro".to_string(),
            timeout_secs: 60,
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            api_base: "https://blob.vercel-storage.com".to_string(),
            token: None,
            local_dir: "./data/blobs".to_string(),
            public_base_url: "http://localhost:8080/files".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            port: 8000,
            chunk_size: 1000,
            chunk_overlap: 200,
            download_timeout_secs: 120,
            metrics_port: 9091,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: true,
            metrics_port: 9090,
            service_name: "cognify".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 50,
            burst: 100,
            enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. APP__SERVER__PORT=8081, APP__VECTOR_INDEX__HOST=https://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve traffic
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.len() < 16 {
            return Err(ConfigError::Message(
                "auth.jwt_secret must be at least 16 characters".to_string(),
            ));
        }
        if self.rag.top_k == 0 {
            return Err(ConfigError::Message("rag.top_k must be greater than zero".to_string()));
        }
        if self.worker.chunk_overlap >= self.worker.chunk_size {
            return Err(ConfigError::Message(
                "worker.chunk_overlap must be smaller than worker.chunk_size".to_string(),
            ));
        }
        if self.worker.metrics_port != 0
            && self.worker.metrics_port == self.observability.metrics_port
        {
            return Err(ConfigError::Message(
                "worker.metrics_port must differ from observability.metrics_port".to_string(),
            ));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.worker.chunk_size, 1000);
        assert_eq!(config.worker.chunk_overlap, 200);
        assert!(config.worker.url.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_gateway_and_worker_exporters_use_separate_ports() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "a-long-enough-test-secret".to_string();
        assert_ne!(config.worker.metrics_port, config.observability.metrics_port);

        config.worker.metrics_port = config.observability.metrics_port;
        assert!(config.validate().is_err());

        config.worker.metrics_port = 0;
        config.observability.metrics_port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_requires_secret() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.jwt_secret = "a-long-enough-test-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "a-long-enough-test-secret".to_string();
        config.worker.chunk_overlap = config.worker.chunk_size;
        assert!(config.validate().is_err());
    }
}
