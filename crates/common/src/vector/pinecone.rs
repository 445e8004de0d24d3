//! Pinecone REST client

use super::{ChunkMetadata, ChunkRecord, TenantFilter, VectorIndex, VectorMatch};
use crate::config::VectorIndexConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Pinecone accepts at most this many vectors per upsert request
const UPSERT_BATCH: usize = 100;

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    namespace: Option<String>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [ChunkRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    filter: Value,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Deserialize)]
struct RawMatch {
    id: String,
    score: f32,
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Deserialize)]
struct Pagination {
    next: Option<String>,
}

fn filter_json(filter: &TenantFilter) -> Value {
    json!({
        "user_id": { "$eq": filter.user_id.to_string() },
        "course_id": { "$eq": filter.course_id.to_string() },
    })
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "vector_index.api_key is required for Pinecone".to_string(),
            })?;
        let host = config
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "vector_index.host is required for Pinecone".to_string(),
            })?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            host,
            namespace: config.namespace.clone().filter(|n| !n.is_empty()),
        })
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        self.send(path, self.client.post(format!("{}{}", self.host, path)).json(body))
            .await
    }

    async fn send(&self, path: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::VectorIndexError {
                message: format!("Request to {} failed: {}", path, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorIndexError {
                message: format!("{} returned {}: {}", path, status, body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
        let mut written = 0;

        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: self.namespace.as_deref(),
            };
            let response: UpsertResponse =
                self.post("/vectors/upsert", &request)
                    .await?
                    .json()
                    .await
                    .map_err(|e| AppError::VectorIndexError {
                        message: format!("Failed to parse upsert response: {}", e),
                    })?;
            written += response.upserted_count;
        }

        debug!(count = written, "Upserted vectors to Pinecone");
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &TenantFilter,
    ) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            filter: filter_json(filter),
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };

        let response: QueryResponse = self
            .post("/query", &request)
            .await?
            .json()
            .await
            .map_err(|e| AppError::VectorIndexError {
                message: format!("Failed to parse query response: {}", e),
            })?;

        let matches = response
            .matches
            .into_iter()
            .filter_map(|m| {
                let metadata = m
                    .metadata
                    .and_then(|v| serde_json::from_value::<ChunkMetadata>(v).ok());
                match metadata {
                    Some(metadata) => Some(VectorMatch {
                        id: m.id,
                        score: m.score,
                        metadata,
                    }),
                    None => {
                        warn!(id = %m.id, "Skipping match with missing or malformed metadata");
                        None
                    }
                }
            })
            .collect();

        Ok(matches)
    }

    /// Serverless indexes cannot delete by metadata filter, so chunk ids
    /// are listed by their `{document_id}-` prefix and deleted by id.
    /// `filter` is only logged; ownership is checked before indexing.
    async fn delete_document(&self, document_id: Uuid, filter: &TenantFilter) -> Result<()> {
        let prefix = format!("{}-", document_id);
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut params = vec![("prefix", prefix.clone())];
            if let Some(ns) = &self.namespace {
                params.push(("namespace", ns.clone()));
            }
            if let Some(t) = token.take() {
                params.push(("paginationToken", t));
            }

            let request = self
                .client
                .get(format!("{}/vectors/list", self.host))
                .query(&params);
            let page: ListResponse = self
                .send("/vectors/list", request)
                .await?
                .json()
                .await
                .map_err(|e| AppError::VectorIndexError {
                    message: format!("Failed to parse list response: {}", e),
                })?;

            ids.extend(page.vectors.into_iter().map(|v| v.id));
            token = page.pagination.and_then(|p| p.next);
            if token.is_none() {
                break;
            }
        }

        for batch in ids.chunks(UPSERT_BATCH) {
            let mut body = json!({ "ids": batch });
            if let Some(ns) = &self.namespace {
                body["namespace"] = json!(ns);
            }
            self.post("/vectors/delete", &body).await?;
        }

        debug!(
            document_id = %document_id,
            user_id = %filter.user_id,
            deleted = ids.len(),
            "Deleted document vectors from Pinecone"
        );
        Ok(())
    }

    fn provider(&self) -> &str {
        "pinecone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_uses_eq_on_both_ids() {
        let filter = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let json = filter_json(&filter);
        assert_eq!(json["user_id"]["$eq"], filter.user_id.to_string());
        assert_eq!(json["course_id"]["$eq"], filter.course_id.to_string());
    }

    #[test]
    fn test_query_request_shape() {
        let filter = TenantFilter::new(Uuid::new_v4(), Uuid::new_v4());
        let request = QueryRequest {
            vector: &[0.5, 0.25],
            top_k: 5,
            filter: filter_json(&filter),
            include_metadata: true,
            namespace: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topK"], 5);
        assert_eq!(json["includeMetadata"], true);
        assert!(json.get("namespace").is_none());
    }

    #[test]
    fn test_host_gets_scheme() {
        let config = VectorIndexConfig {
            provider: "pinecone".to_string(),
            api_key: Some("key".to_string()),
            host: Some("cognify-abc.svc.pinecone.io/".to_string()),
            ..Default::default()
        };
        let index = PineconeIndex::new(&config).unwrap();
        assert_eq!(index.host, "https://cognify-abc.svc.pinecone.io");
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let config = VectorIndexConfig {
            host: Some("h".to_string()),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            PineconeIndex::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
