//! Vector store backends and the fallback factory

pub mod qdrant;
pub mod sqlite;

use crate::config::KnowledgeConfig;
use crate::error::{Result, RetrievalError};
use crate::model::Chunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Payload fields that may appear in a search filter
const FILTERABLE_FIELDS: &[&str] = &[
    "document_id",
    "document_type",
    "chunk_type",
    "normative",
    "clause_number",
];

/// A single filter condition: exact match or set membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Str(String),
    AnyOf(Vec<String>),
}

/// Flat metadata filter over whitelisted payload fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(pub BTreeMap<String, FilterValue>);

impl Filter {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject fields outside the whitelist
    pub fn validate(&self) -> Result<()> {
        for field in self.0.keys() {
            if !FILTERABLE_FIELDS.contains(&field.as_str()) {
                return Err(RetrievalError::InvalidInput(format!(
                    "unknown filter field: {field}"
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the filter against a chunk payload
    pub fn matches(&self, payload: &Value) -> bool {
        self.0.iter().all(|(field, condition)| {
            let actual = payload.get(field).unwrap_or(&Value::Null);
            match condition {
                FilterValue::Bool(expected) => actual.as_bool() == Some(*expected),
                FilterValue::Str(expected) => actual.as_str() == Some(expected.as_str()),
                FilterValue::AnyOf(options) => actual
                    .as_str()
                    .map(|s| options.iter().any(|o| o == s))
                    .unwrap_or(false),
            }
        })
    }
}

/// One scored hit from a vector store
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub payload: Value,
}

/// Store configuration summary reported by `get_stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfigStats {
    pub vector_size: usize,
    pub hybrid_enabled: bool,
}

/// Collection statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub collection_name: String,
    pub total_chunks: usize,
    pub indexed_vectors: usize,
    pub config: StoreConfigStats,
}

/// Common vector store contract, polymorphic over backends
///
/// Upstream code never branches on backend identity; the factory hands
/// out whichever backend passed its health probe.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert chunks; duplicate ids overwrite. Returns the count written.
    ///
    /// Chunks must carry non-empty embeddings of the collection's
    /// declared dimension; anything else is `invalid_input`.
    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Nearest neighbors by cosine similarity, filtered, descending,
    /// with score >= `score_threshold`
    async fn search(
        &self,
        query_vector: &[f32],
        n_results: usize,
        filter: Option<&Filter>,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>>;

    /// Collection statistics
    async fn get_stats(&self) -> Result<StoreStats>;

    /// Lightweight connectivity probe
    async fn health_check(&self) -> bool;

    /// Enumerate `(id, content)` pairs for lexical index rebuilds
    async fn list_texts(&self) -> Result<Vec<(String, String)>>;
}

/// Create a vector store with automatic fallback
///
/// Tries the configured primary first. If its health check fails, falls
/// back to the embedded SQLite store and logs the transition. When both
/// fail this is a fatal `connection_error`.
pub async fn create_store(config: &KnowledgeConfig) -> Result<Arc<dyn VectorStore>> {
    if config.store.backend == "sqlite" {
        let store = sqlite::SqliteStore::open(config).await?;
        if store.health_check().await {
            info!(path = %config.store.sqlite_path, "using embedded vector store");
            return Ok(Arc::new(store));
        }
        return Err(RetrievalError::Connection(
            "embedded vector store failed its health check".to_string(),
        ));
    }

    match qdrant::QdrantStore::new(config) {
        Ok(store) => {
            if store.health_check().await {
                info!(collection = %config.store.collection, "connected to networked vector store");
                return Ok(Arc::new(store));
            }
            warn!("networked vector store failed its health check");
        }
        Err(e) => warn!(error = %e, "networked vector store unavailable"),
    }

    warn!("falling back to the embedded vector store");
    match sqlite::SqliteStore::open(config).await {
        Ok(store) => {
            if store.health_check().await {
                info!(path = %config.store.sqlite_path, "using embedded vector store fallback");
                Ok(Arc::new(store))
            } else {
                Err(RetrievalError::Connection(
                    "no vector store available: primary unreachable and fallback failed its health check"
                        .to_string(),
                ))
            }
        }
        Err(e) => Err(RetrievalError::Connection(format!(
            "no vector store available: primary unreachable and fallback failed: {e}"
        ))),
    }
}
