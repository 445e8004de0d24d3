//! Document upload handler
//!
//! Stores the raw request body in the blob store, records the document and
//! hands it to the processing worker. Dispatch failures do not fail the
//! request; they are visible through the returned status.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{courses::parse_id, required};
use crate::AppState;
use cognify_common::{
    auth::AuthUser,
    db::models::{file_type_from_name, DocumentStatus},
    errors::{AppError, Result},
    metrics,
    storage::{BlobMetadata, StoredBlob},
    worker::{ProcessDocumentRequest, TriggerOutcome},
};

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
    #[serde(rename = "courseId")]
    pub course_id: Option<String>,
}

/// Blob descriptor plus the document it created
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(flatten)]
    pub blob: StoredBlob,
    pub document_id: Uuid,
    pub status: DocumentStatus,
}

/// Upload a document into one of the caller's courses
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<UploadResponse>> {
    let filename = required(&params.filename, "filename")?;
    let course_id = parse_id(required(&params.course_id, "courseId")?, "courseId")?;

    let course = state
        .repo
        .find_course_for_user(course_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::CourseNotFound {
            id: course_id.to_string(),
        })?;

    let limit = state.config.upload.max_bytes;
    let bytes = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let size = headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            metrics::record_upload("rejected", size);
            AppError::PayloadTooLarge { size, limit }
        } else {
            AppError::InvalidFormat {
                message: rejection.body_text(),
            }
        }
    })?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let size = bytes.len();

    let document = state
        .repo
        .create_document(course.id, filename, &file_type_from_name(filename))
        .await?;

    let metadata = BlobMetadata {
        document_id: document.id,
        user_id: auth.user_id,
        course_id: course.id,
    };

    // The document stays UPLOADING if the blob store fails
    let blob = match state
        .blobs
        .put(filename, bytes, &content_type, &metadata)
        .await
    {
        Ok(blob) => blob,
        Err(e) => {
            metrics::record_upload("blob_failed", size);
            tracing::error!(
                document_id = %document.id,
                error = %e,
                "Blob upload failed"
            );
            return Err(e);
        }
    };

    let document = state.repo.mark_document_stored(document.id, &blob.url).await?;

    let job = ProcessDocumentRequest {
        document_id: document.id,
        document_url: blob.url.clone(),
        user_id: auth.user_id,
        course_id: course.id,
        file_type: document.file_type.clone(),
    };

    let status = match state.worker.trigger(&job).await {
        Ok(TriggerOutcome::Dispatched) => DocumentStatus::PendingProcessing,
        Ok(TriggerOutcome::Skipped) => {
            tracing::warn!(
                document_id = %document.id,
                "No worker configured; document left pending"
            );
            DocumentStatus::PendingProcessing
        }
        Err(e) => {
            tracing::error!(
                document_id = %document.id,
                error = %e,
                "Worker dispatch failed"
            );
            state
                .repo
                .update_document_status(document.id, DocumentStatus::WorkerCallFailed)
                .await?;
            DocumentStatus::WorkerCallFailed
        }
    };

    metrics::record_upload(status.as_str(), size);
    tracing::info!(
        document_id = %document.id,
        course_id = %course.id,
        user_id = %auth.user_id,
        size,
        status = status.as_str(),
        "Document uploaded"
    );

    Ok(Json(UploadResponse {
        blob,
        document_id: document.id,
        status,
    }))
}
