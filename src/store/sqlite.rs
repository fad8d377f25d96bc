//! Embedded vector store on SQLite
//!
//! The fallback backend: chunks and their vectors live in a single
//! database file, similarity is a brute-force cosine scan. Feature
//! surface is smaller than the networked store (no sparse channel).

use super::{Filter, ScoredPoint, StoreConfigStats, StoreStats, VectorStore};
use crate::config::KnowledgeConfig;
use crate::error::{Result, RetrievalError};
use crate::model::Chunk;
use crate::util::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed vector store
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    vector_size: usize,
}

impl SqliteStore {
    /// Open the store, creating the database and schema as needed
    pub async fn open(config: &KnowledgeConfig) -> Result<Self> {
        let path = &config.store.sqlite_path;

        let pool = if path == "sqlite::memory:" {
            // A shared pool over a private in-memory database needs a
            // single connection, otherwise each connection sees its own db
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(path)
                .await?
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let options =
                SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?.create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_created_at ON chunks(created_at)")
            .execute(&pool)
            .await?;

        info!(path, collection = %config.store.collection, "embedded vector store ready");

        Ok(Self {
            pool,
            collection: config.store.collection.clone(),
            vector_size: config.embedding.dimensions,
        })
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
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "cannot add an empty chunk list".to_string(),
            ));
        }
        for chunk in chunks {
            self.validate_chunk(chunk)?;
        }

        let mut written = 0usize;
        for chunk in chunks {
            let payload = serde_json::to_string(&chunk.payload())?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks (id, content, embedding, payload, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(chunk.id.to_string())
            .bind(&chunk.text)
            .bind(embedding_to_bytes(&chunk.embedding))
            .bind(payload)
            .bind(chunk.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
            written += 1;
        }

        debug!(written, "upserted chunks into embedded store");
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
        if let Some(filter) = filter {
            filter.validate()?;
        }

        let rows = sqlx::query("SELECT id, content, embedding, payload FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut results = Vec::new();
        for row in rows {
            let payload_json: String = row.get("payload");
            let payload: serde_json::Value = serde_json::from_str(&payload_json)?;

            if let Some(filter) = filter {
                if !filter.matches(&payload) {
                    continue;
                }
            }

            let blob: Vec<u8> = row.get("embedding");
            let embedding = bytes_to_embedding(&blob);
            let score = cosine_similarity(query_vector, &embedding);
            if score < score_threshold {
                continue;
            }

            results.push(ScoredPoint {
                id: row.get("id"),
                content: row.get("content"),
                score,
                payload,
            });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(n_results);

        debug!(results = results.len(), threshold = score_threshold, "embedded store search");
        Ok(results)
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            collection_name: self.collection.clone(),
            total_chunks: count.0 as usize,
            indexed_vectors: count.0 as usize,
            config: StoreConfigStats {
                vector_size: self.vector_size,
                hybrid_enabled: false,
            },
        })
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn list_texts(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT id, content FROM chunks ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("content")))
            .collect())
    }
}
