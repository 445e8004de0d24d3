//! Worker HTTP tests over in-memory SQLite with in-memory documents

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use cognify_common::{
    db::{models::DocumentStatus, DbPool, Repository},
    embeddings::MockEmbedder,
    vector::MemoryVectorIndex,
};
use cognify_worker::{
    chunker::Chunker,
    fetch::DocumentFetcher,
    routes::{create_router, WorkerState},
    DocumentProcessor, WorkerError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Serves blobs from memory, keyed by URL
#[derive(Default)]
struct BlobFetcher {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl BlobFetcher {
    fn put(&self, url: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl DocumentFetcher for BlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WorkerError> {
        self.blobs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| WorkerError::Download {
                url: url.to_string(),
                message: "not found".to_string(),
            })
    }
}

struct TestWorker {
    router: axum::Router,
    repo: Repository,
    index: Arc<MemoryVectorIndex>,
    blobs: Arc<BlobFetcher>,
}

fn post_job(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process-document")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn setup() -> TestWorker {
    let repo = Repository::new(DbPool::in_memory().await.unwrap());
    let index = Arc::new(MemoryVectorIndex::new());
    let blobs = Arc::new(BlobFetcher::default());
    let processor = DocumentProcessor::new(
        repo.clone(),
        blobs.clone(),
        Arc::new(MockEmbedder::new(32)),
        index.clone(),
        Chunker::new(1000, 200).unwrap(),
    );
    let router = create_router(WorkerState {
        processor: Arc::new(processor),
    });
    TestWorker {
        router,
        repo,
        index,
        blobs,
    }
}

#[tokio::test]
async fn test_health() {
    let response = setup()
        .await
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let router = setup().await.router;

    let response = router
        .clone()
        .oneshot(post_job(json!({
            "documentId": "",
            "documentUrl": "https://blob.test/a.pdf",
            "userId": "u",
            "courseId": "c",
            "fileType": "PDF"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["error"]["field"], "documentId");

    let response = router.oneshot(post_job(json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_accepted_job_is_processed_in_background() {
    let TestWorker {
        router,
        repo,
        index,
        blobs,
    } = setup().await;

    let user = repo.create_user("w@example.com", "W", None).await.unwrap();
    let course = repo.create_course(user.id, "Geology", None).await.unwrap();
    let doc = repo
        .create_document(course.id, "rocks.txt", "TXT")
        .await
        .unwrap();

    let url = "https://blob.test/rocks-a1b2.txt";
    blobs.put(url, b"Igneous rocks form from cooled magma.");
    repo.mark_document_stored(doc.id, url).await.unwrap();

    let response = router
        .oneshot(post_job(json!({
            "documentId": doc.id,
            "documentUrl": url,
            "userId": user.id,
            "courseId": course.id,
            "fileType": "TXT"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let mut status = None;
    for _ in 0..100 {
        status = repo
            .find_document_by_id(doc.id)
            .await
            .unwrap()
            .and_then(|d| d.document_status());
        if status.is_some_and(|s| s.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(status, Some(DocumentStatus::Completed));
    let records = index.records_for_document(doc.id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.user_id, user.id);
    assert_eq!(records[0].metadata.course_id, course.id);
}
