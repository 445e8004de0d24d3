//! Document processor
//!
//! One call handles one upload end to end. The document row records the
//! outcome; there is no retry. A job is only trusted once the database
//! confirms the document, course and owner it names belong together.

use crate::chunker::Chunker;
use crate::errors::WorkerError;
use crate::extract::extract_text;
use crate::fetch::DocumentFetcher;
use cognify_common::{
    db::{models::DocumentStatus, Repository},
    errors::AppError,
    metrics,
    vector::{ChunkMetadata, ChunkRecord},
    worker::ProcessDocumentRequest,
    Embedder, TenantFilter, VectorIndex,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub struct DocumentProcessor {
    repo: Repository,
    fetcher: Arc<dyn DocumentFetcher>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunker: Chunker,
}

impl DocumentProcessor {
    pub fn new(
        repo: Repository,
        fetcher: Arc<dyn DocumentFetcher>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunker: Chunker,
    ) -> Self {
        Self {
            repo,
            fetcher,
            embedder,
            index,
            chunker,
        }
    }

    /// Process a document and record the outcome on its row.
    /// Returns the number of chunks indexed.
    #[instrument(skip(self, job), fields(document_id = %job.document_id, file_type = %job.file_type))]
    pub async fn process(&self, job: &ProcessDocumentRequest) -> Result<usize, WorkerError> {
        let start = Instant::now();

        let document_url = match self.verify_job(job).await {
            Ok(url) => url,
            Err(e) => {
                // The row may belong to someone else, so it is left untouched
                warn!(error = %e, "Job rejected");
                metrics::record_document_processed("rejected", 0, start.elapsed().as_secs_f64());
                return Err(e);
            }
        };

        info!("Processing document");
        self.set_status(job, DocumentStatus::Processing).await;

        match self.index_document(job, &document_url).await {
            Ok(chunks) => {
                self.set_status(job, DocumentStatus::Completed).await;
                let elapsed = start.elapsed();
                metrics::record_document_processed("completed", chunks, elapsed.as_secs_f64());
                info!(
                    chunks,
                    latency_ms = elapsed.as_millis() as u64,
                    "Document processed"
                );
                Ok(chunks)
            }
            Err(e) => {
                error!(error = %e, stage = e.kind(), "Document processing failed");
                self.set_status(job, DocumentStatus::Failed).await;
                metrics::record_document_processed("failed", 0, start.elapsed().as_secs_f64());
                Err(e)
            }
        }
    }

    /// Check the job against the stored document and return its blob URL
    async fn verify_job(&self, job: &ProcessDocumentRequest) -> Result<String, WorkerError> {
        let document = self
            .repo
            .find_document_by_id(job.document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: job.document_id.to_string(),
            })?;

        if document.course_id != job.course_id {
            return Err(WorkerError::Rejected(
                "document does not belong to course".to_string(),
            ));
        }

        if self
            .repo
            .find_course_for_user(job.course_id, job.user_id)
            .await?
            .is_none()
        {
            return Err(WorkerError::Rejected(
                "course does not belong to user".to_string(),
            ));
        }

        if document.url.is_empty() || document.url != job.document_url {
            return Err(WorkerError::Rejected(
                "document URL does not match the stored blob".to_string(),
            ));
        }

        Ok(document.url)
    }

    async fn index_document(
        &self,
        job: &ProcessDocumentRequest,
        document_url: &str,
    ) -> Result<usize, WorkerError> {
        let bytes = self.fetcher.fetch(document_url).await?;
        let text = extract_text(&bytes, &job.file_type)?;

        let chunks = self.chunker.split(&text);
        if chunks.is_empty() {
            return Err(WorkerError::EmptyText);
        }

        let vectors = self.embedder.embed_batch(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    vectors.len()
                ),
            }
            .into());
        }

        // Reprocessing must not leave chunks from an older, longer version
        let filter = TenantFilter::new(job.user_id, job.course_id);
        self.index.delete_document(job.document_id, &filter).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, values))| {
                ChunkRecord::new(
                    values,
                    ChunkMetadata {
                        document_id: job.document_id,
                        user_id: job.user_id,
                        course_id: job.course_id,
                        chunk_index: i as u32,
                        text,
                    },
                )
            })
            .collect();

        Ok(self.index.upsert(&records).await?)
    }

    async fn set_status(&self, job: &ProcessDocumentRequest, status: DocumentStatus) {
        if let Err(e) = self.repo.update_document_status(job.document_id, status).await {
            warn!(status = status.as_str(), error = %e, "Failed to update document status");
        }
    }
}
