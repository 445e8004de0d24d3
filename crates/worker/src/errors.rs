//! Worker error types

use cognify_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Job rejected: {0}")]
    Rejected(String),

    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error("PDF parse error: {0}")]
    PdfParse(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Document text is not valid UTF-8")]
    InvalidEncoding,

    #[error("No text extracted from document")]
    EmptyText,

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl WorkerError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Rejected(_) | WorkerError::App(AppError::DocumentNotFound { .. }) => {
                "rejected"
            }
            WorkerError::Download { .. } => "download",
            WorkerError::PdfParse(_)
            | WorkerError::UnsupportedFileType(_)
            | WorkerError::InvalidEncoding
            | WorkerError::EmptyText => "extract",
            WorkerError::Chunking(_) => "chunk",
            WorkerError::Io(_) => "io",
            WorkerError::App(AppError::EmbeddingError { .. }) => "embed",
            WorkerError::App(AppError::VectorIndexError { .. }) => "index",
            WorkerError::App(_) => "internal",
        }
    }
}
