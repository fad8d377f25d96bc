//! Content-addressed embedding cache with per-model partitioning

use crate::error::Result;
use crate::util::{bytes_to_embedding, embedding_to_bytes};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Persistent embedding cache keyed by content hash
///
/// Cache key: SHA-256 of whitespace-collapsed text, a stricter
/// normalization than the chunk dedupe hash (embedding output is
/// insensitive to internal whitespace; chunk identity is not).
/// The model id is encoded into the cache path, so switching models is
/// an implicit invalidation: old entries stay on disk under the old
/// model's directory and are simply never consulted.
pub struct EmbeddingCache {
    pool: SqlitePool,
    model: String,
    size_limit_bytes: u64,
    cache_path: PathBuf,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingCacheStats {
    pub entries: usize,
    pub disk_usage_bytes: u64,
    pub model: String,
    pub size_limit_bytes: u64,
}

impl EmbeddingCache {
    /// Open (or create) the cache for one embedding model
    pub async fn open(cache_dir: &Path, model: &str, size_limit_bytes: u64) -> Result<Self> {
        let cache_path = cache_dir.join(model_safe(model));
        std::fs::create_dir_all(&cache_path)?;

        let db_path = cache_path.join("embeddings.db");
        info!(path = %db_path.display(), model, "opening embedding cache");

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                key TEXT PRIMARY KEY,
                vector BLOB NOT NULL,
                byte_size INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embeddings_last_accessed ON embeddings(last_accessed)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            model: model.to_string(),
            size_limit_bytes,
            cache_path,
        })
    }

    /// Cache key: SHA-256 of text with all whitespace runs collapsed
    pub fn cache_key(text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        hex::encode(Sha256::digest(collapsed.as_bytes()))
    }

    /// Retrieve a cached embedding by content
    pub async fn get(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let key = Self::cache_key(text);

        let row = sqlx::query("SELECT vector FROM embeddings WHERE key = ?1")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let blob: Vec<u8> = row.get("vector");
                // Touch for LRU; recency only, a miss path never waits on this
                sqlx::query("UPDATE embeddings SET last_accessed = ?1 WHERE key = ?2")
                    .bind(Utc::now().to_rfc3339())
                    .bind(&key)
                    .execute(&self.pool)
                    .await?;
                debug!(model = %self.model, "embedding cache hit");
                Ok(Some(bytes_to_embedding(&blob)))
            }
            None => Ok(None),
        }
    }

    /// Store an embedding under the content key
    pub async fn set(&self, text: &str, embedding: &[f32]) -> Result<()> {
        let key = Self::cache_key(text);
        let blob = embedding_to_bytes(embedding);
        let byte_size = blob.len() as i64;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO embeddings (key, vector, byte_size, created_at, last_accessed)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(&key)
        .bind(&blob)
        .bind(byte_size)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.enforce_size_limit().await?;
        Ok(())
    }

    /// Check whether a text is cached
    pub async fn contains(&self, text: &str) -> Result<bool> {
        let key = Self::cache_key(text);
        let row = sqlx::query("SELECT 1 FROM embeddings WHERE key = ?1")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Evict least-recently-used entries down to the byte budget
    async fn enforce_size_limit(&self) -> Result<()> {
        let total: (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(byte_size), 0) FROM embeddings")
                .fetch_one(&self.pool)
                .await?;

        let mut excess = total.0 - self.size_limit_bytes as i64;
        if excess <= 0 {
            return Ok(());
        }

        let mut evicted = 0usize;
        while excess > 0 {
            let victim = sqlx::query_as::<_, (String, i64)>(
                "SELECT key, byte_size FROM embeddings ORDER BY last_accessed ASC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some((key, size)) = victim else { break };
            sqlx::query("DELETE FROM embeddings WHERE key = ?1")
                .bind(&key)
                .execute(&self.pool)
                .await?;
            excess -= size;
            evicted += 1;
        }

        if evicted > 0 {
            info!(evicted, "evicted LRU embedding cache entries");
        }
        Ok(())
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<EmbeddingCacheStats> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(byte_size), 0) FROM embeddings",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(EmbeddingCacheStats {
            entries: row.0 as usize,
            disk_usage_bytes: row.1 as u64,
            model: self.model.clone(),
            size_limit_bytes: self.size_limit_bytes,
        })
    }

    /// Remove all cached embeddings for this model
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM embeddings").execute(&self.pool).await?;
        info!(model = %self.model, "cleared embedding cache");
        Ok(())
    }

    /// Close the cache connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Directory this model's entries live in
    pub fn path(&self) -> &Path {
        &self.cache_path
    }
}

/// Filesystem-safe encoding of a model identifier
fn model_safe(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
