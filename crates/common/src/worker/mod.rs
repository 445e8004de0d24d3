//! Dispatch of uploaded documents to the processing worker

use crate::config::WorkerConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Body of `POST /process-document`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocumentRequest {
    pub document_id: Uuid,
    pub document_url: String,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub file_type: String,
}

/// What happened to a dispatch attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The worker accepted the job
    Dispatched,
    /// No worker is configured
    Skipped,
}

#[async_trait]
pub trait WorkerTrigger: Send + Sync {
    async fn trigger(&self, request: &ProcessDocumentRequest) -> Result<TriggerOutcome>;
}

/// Posts jobs to a worker over HTTP. Any non-2xx answer is a failure.
pub struct HttpWorkerTrigger {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpWorkerTrigger {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/process-document", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl WorkerTrigger for HttpWorkerTrigger {
    async fn trigger(&self, request: &ProcessDocumentRequest) -> Result<TriggerOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::WorkerCallFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::WorkerCallFailed {
                message: format!("worker returned {}: {}", status, body),
            });
        }

        info!(document_id = %request.document_id, "Document sent to worker");
        Ok(TriggerOutcome::Dispatched)
    }
}

/// Used when no worker URL is configured
pub struct DisabledWorkerTrigger;

#[async_trait]
impl WorkerTrigger for DisabledWorkerTrigger {
    async fn trigger(&self, _request: &ProcessDocumentRequest) -> Result<TriggerOutcome> {
        Ok(TriggerOutcome::Skipped)
    }
}

/// Create a worker trigger based on configuration
pub fn create_worker_trigger(config: &WorkerConfig) -> Result<Arc<dyn WorkerTrigger>> {
    match config.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Ok(Arc::new(HttpWorkerTrigger::new(url, config.timeout_secs)?)),
        None => Ok(Arc::new(DisabledWorkerTrigger)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProcessDocumentRequest {
        ProcessDocumentRequest {
            document_id: Uuid::new_v4(),
            document_url: "https://blob.test/a.pdf".to_string(),
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            file_type: "PDF".to_string(),
        }
    }

    #[test]
    fn test_request_is_camel_case() {
        let json = serde_json::to_value(request()).unwrap();
        for key in ["documentId", "documentUrl", "userId", "courseId", "fileType"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[tokio::test]
    async fn test_missing_url_disables_dispatch() {
        let trigger = create_worker_trigger(&WorkerConfig {
            url: Some("  ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            trigger.trigger(&request()).await.unwrap(),
            TriggerOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_failure() {
        // Port 9 (discard) is not expected to accept HTTP
        let trigger = HttpWorkerTrigger::new("http://127.0.0.1:9", 2).unwrap();
        let err = trigger.trigger(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::WorkerCallFailed { .. }));
    }
}
