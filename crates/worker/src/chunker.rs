//! Text chunking
//!
//! Character-sized chunks with overlap, split on the most semantic
//! boundary that fits (paragraph, sentence, word).

use crate::errors::WorkerError;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

pub struct Chunker {
    splitter: TextSplitter<text_splitter::Characters>,
    chunk_size: usize,
}

impl Chunker {
    /// `chunk_overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, WorkerError> {
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| WorkerError::Chunking(e.to_string()))?;

        Ok(Self {
            splitter: TextSplitter::new(config),
            chunk_size,
        })
    }

    /// Split text into non-blank chunks, in document order
    pub fn split(&self, text: &str) -> Vec<String> {
        let chunks: Vec<String> = self
            .splitter
            .chunks(text)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        debug!(
            input_len = text.len(),
            chunk_count = chunks.len(),
            chunk_size = self.chunk_size,
            "Text chunked"
        );

        chunks
    }
}
