//! Vector index client (Qdrant REST API).
//!
//! A stateless wrapper around a remote Qdrant collection holding one
//! point per document chunk. Every search and delete is filtered by
//! `userId` at the index level — tenant isolation is enforced in the
//! filter sent to the backend, never by post-filtering results.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::config::VectorConfig;
use crate::error::RagError;
use crate::models::{ChunkPayload, ScoredChunk, VectorPoint};

const BACKEND: &str = "vector index";

/// Client for one named collection in the vector index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    size: usize,
}

impl VectorIndex {
    /// Build a client for the configured collection.
    ///
    /// `embedding_dims` is the dimensionality the embedding provider
    /// produces; it must equal the collection's configured vector size.
    /// A mismatch is a fatal [`RagError::Configuration`], caught here
    /// rather than surfacing per request.
    pub fn new(config: &VectorConfig, embedding_dims: usize) -> Result<Self, RagError> {
        if embedding_dims != config.size {
            return Err(RagError::Configuration(format!(
                "embedding model produces {embedding_dims}-dim vectors but the \
                 vector collection is sized for {}",
                config.size
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: std::env::var("QDRANT_API_KEY").ok(),
            collection: config.collection.clone(),
            size: config.size,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    /// Create the collection and its payload indexes if absent.
    ///
    /// Idempotent and cheap when the collection already exists, so it is
    /// safe to call before every operation. The `userId` and `documentId`
    /// payload fields get keyword indexes to make the tenant filter an
    /// index lookup rather than a scan.
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let path = format!("/collections/{}", self.collection);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(RagError::unavailable(
                BACKEND,
                format!("collection lookup failed: {}", response.status()),
            ));
        }

        debug!(collection = %self.collection, "creating vector collection");
        let create = self
            .request(reqwest::Method::PUT, &path)
            .json(&json!({
                "vectors": { "size": self.size, "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;
        // A concurrent creator winning the race reports a conflict; the
        // collection exists either way.
        if !create.status().is_success() && create.status() != reqwest::StatusCode::CONFLICT {
            return Err(RagError::unavailable(
                BACKEND,
                format!("collection create failed: {}", create.status()),
            ));
        }

        for field in ["userId", "documentId"] {
            let index = self
                .request(reqwest::Method::PUT, &format!("{path}/index"))
                .json(&json!({
                    "field_name": field,
                    "field_schema": "keyword"
                }))
                .send()
                .await
                .map_err(|e| RagError::unavailable(BACKEND, e))?;
            if !index.status().is_success() && index.status() != reqwest::StatusCode::CONFLICT {
                return Err(RagError::unavailable(
                    BACKEND,
                    format!("payload index create failed for {field}: {}", index.status()),
                ));
            }
        }

        Ok(())
    }

    /// Upsert a batch of points, waiting for durability acknowledgment.
    /// A failed batch surfaces as a single error; there is no
    /// partial-success reporting at this layer.
    pub async fn upsert(&self, points: &[VectorPoint]) -> Result<(), RagError> {
        self.ensure_collection().await?;

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points", self.collection),
            )
            .query(&[("wait", "true")])
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::unavailable(
                BACKEND,
                format!("upsert failed: {status}: {body}"),
            ));
        }

        Ok(())
    }

    /// Nearest-neighbor search by cosine similarity, always filtered to
    /// `user_id` and additionally to `document_id` when given.
    pub async fn search(
        &self,
        vector: &[f32],
        user_id: &str,
        document_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        self.ensure_collection().await?;

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "filter": tenant_filter(user_id, document_id),
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        if !response.status().is_success() {
            return Err(RagError::unavailable(
                BACKEND,
                format!("search failed: {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;
        parse_search_response(&body)
    }

    /// Remove every point belonging to the given (user, document) pair.
    /// Idempotent — deleting an already-deleted document is a no-op.
    pub async fn delete_by_document(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> Result<(), RagError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", "true")])
            .json(&json!({ "filter": tenant_filter(user_id, Some(document_id)) }))
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        if !response.status().is_success() {
            return Err(RagError::unavailable(
                BACKEND,
                format!("delete failed: {}", response.status()),
            ));
        }

        Ok(())
    }

    /// Exact count of stored points for a user across all documents.
    pub async fn count_for_user(&self, user_id: &str) -> Result<u64, RagError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/count", self.collection),
            )
            .json(&json!({
                "filter": tenant_filter(user_id, None),
                "exact": true,
            }))
            .send()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;

        if !response.status().is_success() {
            return Err(RagError::unavailable(
                BACKEND,
                format!("count failed: {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RagError::unavailable(BACKEND, e))?;
        Ok(body
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}

/// Build the payload filter enforcing tenant isolation. The `userId`
/// condition is unconditional; `documentId` is appended when scoping to
/// one document.
fn tenant_filter(user_id: &str, document_id: Option<&str>) -> Value {
    let mut must = vec![json!({ "key": "userId", "match": { "value": user_id } })];
    if let Some(doc) = document_id {
        must.push(json!({ "key": "documentId", "match": { "value": doc } }));
    }
    json!({ "must": must })
}

fn parse_search_response(body: &Value) -> Result<Vec<ScoredChunk>, RagError> {
    let hits = body
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| RagError::unavailable(BACKEND, "malformed search response"))?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let payload: ChunkPayload = hit
            .get("payload")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| RagError::unavailable(BACKEND, format!("malformed payload: {e}")))?
            .ok_or_else(|| RagError::unavailable(BACKEND, "search hit without payload"))?;
        results.push(ScoredChunk { score, payload });
    }

    Ok(results)
}
