//! Worker HTTP surface

use crate::processor::DocumentProcessor;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use cognify_common::{
    errors::{AppError, Result},
    worker::ProcessDocumentRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct WorkerState {
    pub processor: Arc<DocumentProcessor>,
}

/// Raw job body; every field is required and non-blank
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocumentBody {
    pub document_id: Option<String>,
    pub document_url: Option<String>,
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing(name))
}

fn uuid_field(value: &Option<String>, name: &str) -> Result<Uuid> {
    Uuid::parse_str(field(value, name)?).map_err(|_| AppError::Validation {
        message: format!("{} must be a UUID", name),
        field: Some(name.to_string()),
    })
}

impl ProcessDocumentBody {
    pub fn into_job(self) -> Result<ProcessDocumentRequest> {
        Ok(ProcessDocumentRequest {
            document_id: uuid_field(&self.document_id, "documentId")?,
            document_url: field(&self.document_url, "documentUrl")?.to_string(),
            user_id: uuid_field(&self.user_id, "userId")?,
            course_id: uuid_field(&self.course_id, "courseId")?,
            file_type: field(&self.file_type, "fileType")?.to_string(),
        })
    }
}

pub fn create_router(state: WorkerState) -> Router {
    Router::new()
        .route("/process-document", post(process_document))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept a job and process it in the background
async fn process_document(
    State(state): State<WorkerState>,
    payload: std::result::Result<Json<ProcessDocumentBody>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let Json(body) = payload?;
    let job = body.into_job()?;

    tracing::info!(document_id = %job.document_id, "Document accepted");

    let processor = state.processor.clone();
    tokio::spawn(async move {
        // The outcome is recorded on the document row
        let _ = processor.process(&job).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Document processing started in background.",
        }),
    ))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
