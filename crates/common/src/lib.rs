//! Cognify Common Library
//!
//! Shared code for the Cognify gateway and document worker:
//! - Database models and repository
//! - Authentication (JWT sessions, password hashing)
//! - Embedding, vector index and generation clients
//! - Blob storage and worker dispatch
//! - The retrieval-augmented query pipeline
//! - Error types, configuration and metrics

pub mod auth;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod generation;
pub mod metrics;
pub mod rag;
pub mod storage;
pub mod vector;
pub mod worker;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use generation::Generator;
pub use rag::RagPipeline;
pub use storage::BlobStore;
pub use vector::{TenantFilter, VectorIndex};
pub use worker::WorkerTrigger;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
