//! Text extraction from downloaded documents
//!
//! PDFs go through lopdf page by page; plain text and markdown are read as
//! UTF-8. Anything else is rejected.

use crate::errors::WorkerError;
use tracing::{debug, warn};

/// Extract the text of a document of the given file type (`PDF`, `TXT`, ...)
pub fn extract_text(bytes: &[u8], file_type: &str) -> Result<String, WorkerError> {
    let text = match file_type.trim().to_uppercase().as_str() {
        "PDF" => extract_pdf(bytes)?,
        "TXT" | "TEXT" | "MD" | "MARKDOWN" => extract_utf8(bytes)?,
        other => return Err(WorkerError::UnsupportedFileType(other.to_string())),
    };

    if text.trim().is_empty() {
        return Err(WorkerError::EmptyText);
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, WorkerError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| WorkerError::PdfParse(format!("Failed to load PDF: {}", e)))?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&clean_line_noise(&page_text));
                text.push_str("\n\n");
            }
            Err(e) => {
                warn!(page, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    Ok(text)
}

fn extract_utf8(bytes: &[u8]) -> Result<String, WorkerError> {
    let text = std::str::from_utf8(bytes).map_err(|_| WorkerError::InvalidEncoding)?;
    Ok(text.trim_start_matches('\u{FEFF}').to_string())
}

/// Collapse whitespace runs inside lines and drop empty lines
fn clean_line_noise(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.replace('\u{0}', "")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
