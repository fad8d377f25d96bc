//! Networked vector store over the Qdrant HTTP API
//!
//! The primary backend. The collection is created on first use with
//! cosine distance; the optional hybrid mode attaches a sparse vector
//! channel at creation time.

use super::{Filter, FilterValue, ScoredPoint, StoreConfigStats, StoreStats, VectorStore};
use crate::config::KnowledgeConfig;
use crate::error::{Result, RetrievalError};
use crate::model::Chunk;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const UPSERT_BATCH: usize = 64;
const SCROLL_PAGE: usize = 256;

/// Qdrant REST client implementing the store contract
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    vector_size: usize,
    hybrid: bool,
    collection_ready: OnceCell<()>,
}

impl QdrantStore {
    pub fn new(config: &KnowledgeConfig) -> Result<Self> {
        if config.store.qdrant_url.is_empty() {
            return Err(RetrievalError::Config(
                "networked vector store requires a URL".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.store.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            base_url: config.store.qdrant_url.trim_end_matches('/').to_string(),
            api_key: if config.store.qdrant_api_key.is_empty() {
                None
            } else {
                Some(config.store.qdrant_api_key.clone())
            },
            collection: config.store.collection.clone(),
            vector_size: config.embedding.dimensions,
            hybrid: config.store.hybrid_search,
            collection_ready: OnceCell::new(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    fn status_error(status: reqwest::StatusCode, context: &str) -> RetrievalError {
        match status.as_u16() {
            401 | 403 => RetrievalError::Auth(format!("vector store rejected credentials ({context})")),
            404 => RetrievalError::NotFound(format!("vector store resource missing ({context})")),
            429 => RetrievalError::RateLimited(format!("vector store rate limit ({context})")),
            408 => RetrievalError::Timeout(format!("vector store timeout ({context})")),
            s => RetrievalError::Connection(format!("vector store returned status {s} ({context})")),
        }
    }

    /// Create the collection on first use
    async fn ensure_collection(&self) -> Result<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                let exists = self
                    .request(reqwest::Method::GET, &format!("/collections/{}", self.collection))
                    .send()
                    .await?
                    .status()
                    .is_success();
                if exists {
                    return Ok(());
                }

                let mut body = json!({
                    "vectors": {
                        "size": self.vector_size,
                        "distance": "Cosine",
                    }
                });
                if self.hybrid {
                    body["sparse_vectors"] = json!({"text": {}});
                }

                info!(collection = %self.collection, size = self.vector_size, "creating collection");
                let response = self
                    .request(reqwest::Method::PUT, &format!("/collections/{}", self.collection))
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Self::status_error(status, "create collection"));
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }

    fn validate_chunk(&self, chunk: &Chunk) -> Result<()> {
        if chunk.embedding.is_empty() {
            return Err(RetrievalError::InvalidInput(format!(
                "chunk {} has no embedding",
                chunk.id
            )));
        }
        if chunk.embedding.len() != self.vector_size {
            return Err(RetrievalError::InvalidInput(format!(
                "chunk {} has a {}-dimensional embedding, collection expects {}",
                chunk.id,
                chunk.embedding.len(),
                self.vector_size
            )));
        }
        Ok(())
    }

    fn filter_to_qdrant(filter: &Filter) -> Value {
        let must: Vec<Value> = filter
            .0
            .iter()
            .map(|(field, condition)| match condition {
                FilterValue::Bool(b) => json!({"key": field, "match": {"value": b}}),
                FilterValue::Str(s) => json!({"key": field, "match": {"value": s}}),
                FilterValue::AnyOf(options) => json!({"key": field, "match": {"any": options}}),
            })
            .collect();
        json!({"must": must})
    }

    fn point_to_scored(point: &Value) -> Option<ScoredPoint> {
        let id = match &point["id"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let payload = point.get("payload").cloned().unwrap_or(Value::Null);
        let content = payload
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        let score = point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;

        Some(ScoredPoint {
            id,
            content,
            score,
            payload,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "cannot add an empty chunk list".to_string(),
            ));
        }
        for chunk in chunks {
            self.validate_chunk(chunk)?;
        }
        self.ensure_collection().await?;

        let mut written = 0usize;
        for group in chunks.chunks(UPSERT_BATCH) {
            let points: Vec<Value> = group
                .iter()
                .map(|chunk| {
                    json!({
                        "id": chunk.id.to_string(),
                        "vector": chunk.embedding,
                        "payload": chunk.payload(),
                    })
                })
                .collect();

            let response = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/collections/{}/points?wait=true", self.collection),
                )
                .json(&json!({"points": points}))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(Self::status_error(status, "upsert points"));
            }
            written += group.len();
        }

        debug!(written, collection = %self.collection, "upserted chunks");
        Ok(written)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        n_results: usize,
        filter: Option<&Filter>,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        if query_vector.len() != self.vector_size {
            return Err(RetrievalError::InvalidInput(format!(
                "query vector has {} dimensions, collection expects {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": n_results,
            "with_payload": true,
        });
        if score_threshold > 0.0 {
            body["score_threshold"] = json!(score_threshold);
        }
        if let Some(filter) = filter {
            filter.validate()?;
            if !filter.is_empty() {
                body["filter"] = Self::filter_to_qdrant(filter);
            }
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, "search"));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .get("result")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results: Vec<ScoredPoint> =
            hits.iter().filter_map(Self::point_to_scored).collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        debug!(results = results.len(), "networked store search");
        Ok(results)
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let response = self
            .request(reqwest::Method::GET, &format!("/collections/{}", self.collection))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, "collection info"));
        }

        let parsed: Value = response.json().await?;
        let result = &parsed["result"];

        Ok(StoreStats {
            collection_name: self.collection.clone(),
            total_chunks: result["points_count"].as_u64().unwrap_or(0) as usize,
            indexed_vectors: result["indexed_vectors_count"]
                .as_u64()
                .or_else(|| result["points_count"].as_u64())
                .unwrap_or(0) as usize,
            config: StoreConfigStats {
                vector_size: self.vector_size,
                hybrid_enabled: self.hybrid,
            },
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .request(reqwest::Method::GET, "/collections")
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e.without_url(), "vector store health check failed");
                false
            }
        }
    }

    async fn list_texts(&self) -> Result<Vec<(String, String)>> {
        let mut texts = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(offset) = &offset {
                body["offset"] = offset.clone();
            }

            let response = self
                .request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/scroll", self.collection),
                )
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(Self::status_error(status, "scroll"));
            }

            let parsed: Value = response.json().await?;
            let points = parsed["result"]["points"].as_array().cloned().unwrap_or_default();
            for point in &points {
                if let Some(scored) = Self::point_to_scored(point) {
                    texts.push((scored.id, scored.content));
                }
            }

            match parsed["result"].get("next_page_offset") {
                Some(next) if !next.is_null() => offset = Some(next.clone()),
                _ => break,
            }
        }

        Ok(texts)
    }
}
