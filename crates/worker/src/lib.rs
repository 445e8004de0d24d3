//! Cognify document worker
//!
//! Turns an uploaded document into indexed chunks:
//! download -> extract text -> chunk -> embed -> upsert, with the
//! document status moving `PROCESSING -> COMPLETED | FAILED`.

pub mod chunker;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod processor;
pub mod routes;

pub use errors::WorkerError;
pub use processor::DocumentProcessor;
