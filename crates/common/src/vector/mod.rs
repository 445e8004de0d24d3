//! Vector index abstraction
//!
//! Every query takes a mandatory `TenantFilter`; there is no unfiltered
//! query path. Backends:
//! - Pinecone REST API
//! - PostgreSQL with pgvector
//! - In-memory brute-force cosine index for tests

mod memory;
mod pg;
mod pinecone;

pub use memory::MemoryVectorIndex;
pub use pg::PgVectorIndex;
pub use pinecone::PineconeIndex;

use crate::config::VectorIndexConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// The (user, course) pair every retrieval is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantFilter {
    pub user_id: Uuid,
    pub course_id: Uuid,
}

impl TenantFilter {
    pub fn new(user_id: Uuid, course_id: Uuid) -> Self {
        Self { user_id, course_id }
    }

    /// True if the chunk belongs to this user and course
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.user_id == self.user_id && metadata.course_id == self.course_id
    }
}

/// Metadata stored alongside every chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    #[serde(deserialize_with = "deserialize_index")]
    pub chunk_index: u32,
    pub text: String,
}

// Some indexes hand numeric metadata back as floats.
fn deserialize_index<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "invalid chunk index {}",
            value
        )));
    }
    Ok(value as u32)
}

/// A chunk vector ready for upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl ChunkRecord {
    /// Build a record with the `{document_id}-{chunk_index}` id
    pub fn new(values: Vec<f32>, metadata: ChunkMetadata) -> Self {
        Self {
            id: chunk_id(metadata.document_id, metadata.chunk_index),
            values,
            metadata,
        }
    }
}

/// Stable chunk id; re-processing a document overwrites its chunks
pub fn chunk_id(document_id: Uuid, chunk_index: u32) -> String {
    format!("{}-{}", document_id, chunk_index)
}

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id; returns the number written
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize>;

    /// Top-k most similar vectors restricted to `filter`, best first
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &TenantFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Remove every chunk of a document within `filter`.
    ///
    /// Chunk ids are keyed by document id alone and some backends cannot
    /// filter deletes by metadata, so `filter` is advisory there. Callers
    /// must have checked that the tenant owns the document.
    async fn delete_document(&self, document_id: Uuid, filter: &TenantFilter) -> Result<()>;

    /// Backend name for logs and metrics
    fn provider(&self) -> &str;
}

/// Create a vector index based on configuration.
///
/// `database_url` is used by the pgvector backend.
pub async fn create_vector_index(
    config: &VectorIndexConfig,
    database_url: &str,
    dimension: usize,
) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config)?)),
        "pgvector" => {
            let index = PgVectorIndex::connect(database_url, &config.table, dimension).await?;
            index.ensure_table().await?;
            Ok(Arc::new(index))
        }
        "memory" => Ok(Arc::new(MemoryVectorIndex::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown vector index provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(user_id: Uuid, course_id: Uuid) -> ChunkMetadata {
        ChunkMetadata {
            document_id: Uuid::new_v4(),
            user_id,
            course_id,
            chunk_index: 0,
            text: "text".to_string(),
        }
    }

    #[test]
    fn test_filter_requires_both_ids() {
        let user = Uuid::new_v4();
        let course = Uuid::new_v4();
        let filter = TenantFilter::new(user, course);

        assert!(filter.matches(&metadata(user, course)));
        assert!(!filter.matches(&metadata(user, Uuid::new_v4())));
        assert!(!filter.matches(&metadata(Uuid::new_v4(), course)));
    }

    #[test]
    fn test_record_id_format() {
        let doc = Uuid::new_v4();
        let mut meta = metadata(Uuid::new_v4(), Uuid::new_v4());
        meta.document_id = doc;
        meta.chunk_index = 7;

        let record = ChunkRecord::new(vec![0.1], meta);
        assert_eq!(record.id, format!("{}-7", doc));
    }

    #[test]
    fn test_chunk_index_accepts_float_json() {
        let json = serde_json::json!({
            "document_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "course_id": Uuid::new_v4(),
            "chunk_index": 3.0,
            "text": "hello"
        });
        let meta: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.chunk_index, 3);

        let bad = serde_json::json!({
            "document_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "course_id": Uuid::new_v4(),
            "chunk_index": 1.5,
            "text": "hello"
        });
        assert!(serde_json::from_value::<ChunkMetadata>(bad).is_err());
    }
}
