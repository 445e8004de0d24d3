//! Retrieval-augmented answering
//!
//! question -> embed -> tenant-filtered vector query -> grounded prompt -> answer

use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::generation::Generator;
use crate::vector::{TenantFilter, VectorIndex, VectorMatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Context placed in the prompt when retrieval finds nothing
pub const FALLBACK_CONTEXT: &str = "No specific context found.";

/// A chunk that contributed to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub chunk_index: u32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub context_found: bool,
    pub sources: Vec<SourceRef>,
}

/// The query pipeline, shared by all chat requests
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            top_k: top_k.max(1),
        }
    }

    /// Answer `question` using only chunks visible under `filter`
    pub async fn answer(&self, question: &str, filter: &TenantFilter) -> Result<RagAnswer> {
        let start = Instant::now();

        let vector = self.embedder.embed(question).await?;
        let raw = self.index.query(&vector, self.top_k, filter).await?;

        let raw_count = raw.len();
        let matches: Vec<VectorMatch> = raw
            .into_iter()
            .filter(|m| {
                let ok = filter.matches(&m.metadata);
                if !ok {
                    warn!(
                        index = self.index.provider(),
                        match_id = %m.id,
                        user_id = %filter.user_id,
                        course_id = %filter.course_id,
                        "Vector index returned a match outside the tenant filter; dropping it"
                    );
                }
                ok
            })
            .collect();
        let rejected = raw_count - matches.len();

        let context = build_context(&matches);
        let context_found = !matches.is_empty();
        let prompt = build_prompt(&context, question);
        debug!(matches = matches.len(), prompt_len = prompt.len(), "Prompt built");

        let answer = self.generator.generate(&prompt).await?;

        let elapsed = start.elapsed();
        crate::metrics::record_rag_query(elapsed.as_secs_f64(), context_found, rejected);
        info!(
            user_id = %filter.user_id,
            course_id = %filter.course_id,
            matches = matches.len(),
            model = self.generator.model_name(),
            latency_ms = elapsed.as_millis() as u64,
            "RAG query answered"
        );

        Ok(RagAnswer {
            answer,
            context_found,
            sources: matches
                .iter()
                .map(|m| SourceRef {
                    document_id: m.metadata.document_id,
                    chunk_index: m.metadata.chunk_index,
                    score: m.score,
                })
                .collect(),
        })
    }
}

/// Join matched chunk texts with blank lines, or the fallback when empty
pub fn build_context(matches: &[VectorMatch]) -> String {
    if matches.is_empty() {
        return FALLBACK_CONTEXT.to_string();
    }
    matches
        .iter()
        .map(|m| m.metadata.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Grounded prompt for the study assistant
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful AI study assistant named Cognify.\n\
         Your goal is to answer questions based on the provided course material.\n\n\
         Course Material Context:\n\
         {context}\n\n\
         User's Question: {question}\n\n\
         If the answer is not available in the provided context, state that you don't have \
         enough information from the material. Do not make up answers."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::errors::AppError;
    use crate::generation::MockGenerator;
    use crate::vector::{ChunkMetadata, ChunkRecord, MemoryVectorIndex};
    use async_trait::async_trait;

    /// A chunk of a fresh document, so records never share an id
    fn chunk(filter: &TenantFilter, index: u32, text: &str, values: Vec<f32>) -> ChunkRecord {
        ChunkRecord::new(
            values,
            ChunkMetadata {
                document_id: Uuid::new_v4(),
                user_id: filter.user_id,
                course_id: filter.course_id,
                chunk_index: index,
                text: text.to_string(),
            },
        )
    }

    /// Ignores the filter entirely
    struct LeakyIndex {
        records: Vec<ChunkRecord>,
    }

    #[async_trait]
    impl VectorIndex for LeakyIndex {
        async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
            _filter: &TenantFilter,
        ) -> Result<Vec<VectorMatch>> {
            Ok(self
                .records
                .iter()
                .map(|r| VectorMatch {
                    id: r.id.clone(),
                    score: 0.9,
                    metadata: r.metadata.clone(),
                })
                .collect())
        }

        async fn delete_document(&self, _document_id: Uuid, _filter: &TenantFilter) -> Result<()> {
            Ok(())
        }

        fn provider(&self) -> &str {
            "leaky"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "down".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingError {
                message: "down".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    #[test]
    fn test_context_joins_with_blank_lines() {
        let filter = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let matches: Vec<VectorMatch> = ["alpha", "beta"]
            .iter()
            .enumerate()
            .map(|(i, t)| VectorMatch {
                id: i.to_string(),
                score: 1.0,
                metadata: chunk(&filter, i as u32, t, vec![]).metadata,
            })
            .collect();

        assert_eq!(build_context(&matches), "alpha\n\nbeta");
        assert_eq!(build_context(&[]), FALLBACK_CONTEXT);
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("cells divide", "What is mitosis?");
        assert!(prompt.contains("Cognify"));
        assert!(prompt.contains("cells divide"));
        assert!(prompt.contains("User's Question: What is mitosis?"));
        assert!(prompt.contains("Do not make up answers."));
    }

    #[tokio::test]
    async fn test_answer_uses_only_tenant_chunks() {
        let embedder = Arc::new(MockEmbedder::new(64));
        let index = Arc::new(MemoryVectorIndex::new());
        let generator = Arc::new(MockGenerator::with_answer("Mitosis is cell division."));

        let mine = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let other = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());

        let mine_text = "Mitosis is the process of cell division";
        let other_text = "Mitosis secret notes from another student";
        index
            .upsert(&[
                chunk(&mine, 0, mine_text, embedder.embed(mine_text).await.unwrap()),
                chunk(&other, 0, other_text, embedder.embed(other_text).await.unwrap()),
            ])
            .await
            .unwrap();

        assert_eq!(index.len().await, 2);

        let pipeline = RagPipeline::new(embedder, index, generator.clone(), 5);
        let answer = pipeline.answer("What is mitosis?", &mine).await.unwrap();

        assert_eq!(answer.answer, "Mitosis is cell division.");
        assert!(answer.context_found);
        assert_eq!(answer.sources.len(), 1);

        let prompts = generator.prompts().await;
        assert!(prompts[0].contains(mine_text));
        assert!(!prompts[0].contains(other_text));
    }

    #[tokio::test]
    async fn test_mismatched_matches_are_dropped() {
        let mine = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let other = TenantFilter::new(mine.user_id, Uuid::new_v4());
        let index = Arc::new(LeakyIndex {
            records: vec![
                chunk(&mine, 0, "my notes", vec![1.0]),
                chunk(&other, 0, "other course notes", vec![1.0]),
            ],
        });
        let generator = Arc::new(MockGenerator::new());

        let pipeline =
            RagPipeline::new(Arc::new(MockEmbedder::new(8)), index, generator.clone(), 5);
        let answer = pipeline.answer("notes?", &mine).await.unwrap();

        assert_eq!(answer.sources.len(), 1);
        let prompts = generator.prompts().await;
        assert!(prompts[0].contains("my notes"));
        assert!(!prompts[0].contains("other course notes"));
    }

    #[tokio::test]
    async fn test_empty_index_uses_fallback_context() {
        let generator = Arc::new(MockGenerator::new());
        let pipeline = RagPipeline::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MemoryVectorIndex::new()),
            generator.clone(),
            5,
        );
        let filter = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());

        let answer = pipeline.answer("anything", &filter).await.unwrap();
        assert!(!answer.context_found);
        assert!(answer.sources.is_empty());
        assert!(generator.prompts().await[0].contains(FALLBACK_CONTEXT));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let generator = Arc::new(MockGenerator::new());
        let pipeline = RagPipeline::new(
            Arc::new(FailingEmbedder),
            Arc::new(MemoryVectorIndex::new()),
            generator.clone(),
            5,
        );
        let filter = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());

        let err = pipeline.answer("q", &filter).await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingError { .. }));
        assert!(generator.prompts().await.is_empty());
    }
}
