//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized `cognify_*` naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Cognify metrics
pub const METRICS_PREFIX: &str = "cognify";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Buckets for upstream model calls and document processing
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1m
    120.0, // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // RAG metrics
    describe_counter!(
        format!("{}_rag_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval-augmented queries, labelled by whether context was found"
    );

    describe_histogram!(
        format!("{}_rag_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end RAG latency in seconds"
    );

    describe_counter!(
        format!("{}_rag_rejected_matches_total", METRICS_PREFIX),
        Unit::Count,
        "Index matches dropped for not matching the tenant filter"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Upload and processing metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Uploads by resulting document status"
    );

    describe_counter!(
        format!("{}_upload_bytes_total", METRICS_PREFIX),
        Unit::Bytes,
        "Bytes accepted by the upload endpoint"
    );

    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Documents processed by the worker, by outcome"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks upserted into the vector index"
    );

    describe_histogram!(
        format!("{}_processing_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document processing latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one RAG query
pub fn record_rag_query(duration_secs: f64, context_found: bool, rejected_matches: usize) {
    counter!(
        format!("{}_rag_queries_total", METRICS_PREFIX),
        "context_found" => context_found.to_string()
    )
    .increment(1);

    histogram!(format!("{}_rag_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if rejected_matches > 0 {
        counter!(format!("{}_rag_rejected_matches_total", METRICS_PREFIX))
            .increment(rejected_matches as u64);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model = model, batch_size = batch_size, "Embedding batch done");
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Record an upload by the status the document ended in
pub fn record_upload(status: &str, bytes: usize) {
    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    counter!(format!("{}_upload_bytes_total", METRICS_PREFIX)).increment(bytes as u64);
}

/// Record a finished worker job
pub fn record_document_processed(outcome: &str, chunks: usize, duration_secs: f64) {
    counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(format!("{}_chunks_indexed_total", METRICS_PREFIX)).increment(chunks as u64);

    histogram!(
        format!("{}_processing_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, UPSTREAM_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        let metrics = RequestMetrics::start("GET", "/api/courses");
        metrics.finish(200);
        record_rag_query(0.2, true, 1);
        record_upload("PENDING_PROCESSING", 1024);
        record_document_processed("completed", 12, 3.5);
    }
}
