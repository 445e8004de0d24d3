//! In-memory vector index for tests and local development.
//!
//! Brute-force cosine similarity over every stored record.

use super::{ChunkRecord, TenantFilter, VectorIndex, VectorMatch};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryVectorIndex {
    records: RwLock<HashMap<String, ChunkRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Records belonging to a document, ordered by chunk index
    pub async fn records_for_document(&self, document_id: Uuid) -> Vec<ChunkRecord> {
        let mut records: Vec<ChunkRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.metadata.document_id == document_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.metadata.chunk_index);
        records
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &TenantFilter,
    ) -> Result<Vec<VectorMatch>> {
        let stored = self.records.read().await;

        let mut matches: Vec<VectorMatch> = stored
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_sim(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete_document(&self, document_id: Uuid, filter: &TenantFilter) -> Result<()> {
        self.records
            .write()
            .await
            .retain(|_, r| !(r.metadata.document_id == document_id && filter.matches(&r.metadata)));
        Ok(())
    }

    fn provider(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ChunkMetadata;

    fn record(filter: &TenantFilter, doc: Uuid, index: u32, values: Vec<f32>) -> ChunkRecord {
        ChunkRecord::new(
            values,
            ChunkMetadata {
                document_id: doc,
                user_id: filter.user_id,
                course_id: filter.course_id,
                chunk_index: index,
                text: format!("chunk {}", index),
            },
        )
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity_within_tenant() {
        let index = MemoryVectorIndex::new();
        let mine = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let theirs = TenantFilter::new(Uuid::new_v4(), mine.course_id);
        let doc = Uuid::new_v4();

        index
            .upsert(&[
                record(&mine, doc, 0, vec![1.0, 0.0]),
                record(&mine, doc, 1, vec![0.6, 0.8]),
                record(&theirs, Uuid::new_v4(), 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 5, &mine).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].metadata.chunk_index, 0);
        assert!(matches.iter().all(|m| mine.matches(&m.metadata)));

        let top1 = index.query(&[1.0, 0.0], 1, &mine).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = MemoryVectorIndex::new();
        let filter = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let doc = Uuid::new_v4();

        index.upsert(&[record(&filter, doc, 0, vec![1.0])]).await.unwrap();
        index.upsert(&[record(&filter, doc, 0, vec![0.5])]).await.unwrap();
        assert_eq!(index.len().await, 1);

        index.delete_document(doc, &filter).await.unwrap();
        assert!(index.is_empty().await);
    }
}
