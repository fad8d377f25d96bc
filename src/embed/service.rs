//! Embedding service: provider + cache + token tracking composition

use super::cache::EmbeddingCache;
use super::tracker::TokenTracker;
use super::Embedder;
use crate::error::{Result, RetrievalError};
use futures::future;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

const RETRY_BASE_DELAY_MS: u64 = 250;

/// Cache-aware embedding layer consumed by ingestion and retrieval
///
/// Per text: cache lookup first; on a miss the provider is called, the
/// cost recorded, and the result written back. Concurrent requests for
/// the same text are coalesced so the provider runs once (single-flight).
pub struct EmbeddingService {
    provider: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    tracker: Arc<TokenTracker>,
    batch_size: usize,
    max_retries: u32,
    inflight: Mutex<HashMap<String, Arc<OnceCell<Vec<f32>>>>>,
}

impl EmbeddingService {
    pub fn new(
        provider: Arc<dyn Embedder>,
        cache: EmbeddingCache,
        tracker: Arc<TokenTracker>,
        batch_size: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            cache,
            tracker,
            batch_size: batch_size.max(1),
            max_retries,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn tracker(&self) -> &TokenTracker {
        &self.tracker
    }

    /// Embed a single text, cache-aware and single-flight
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        if let Some(vector) = self.cache.get(text).await? {
            self.tracker.track_embedding(text, true);
            return Ok(vector);
        }

        let key = EmbeddingCache::cache_key(text);
        let cell = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key.clone()).or_default())
        };

        let result = cell
            .get_or_try_init(|| async {
                let vector = self
                    .with_retry(|| async { self.provider.embed(text).await })
                    .await?;
                self.tracker.track_embedding(text, false);
                self.cache.set(text, &vector).await?;
                Ok::<_, RetrievalError>(vector)
            })
            .await
            .cloned();

        // Drop the registry entry so a failed call can be retried and a
        // finished one does not pin its vector in memory
        self.inflight.lock().await.remove(&key);

        result
    }

    /// Embed many texts, preserving input order 1:1
    ///
    /// Cache hits and misses are scatter-gathered without reordering;
    /// misses go to the provider concurrently in groups of at most
    /// `batch_size`. A failing group fails the whole call; groups that
    /// already completed keep their cache entries.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RetrievalError::InvalidInput(format!(
                "cannot embed empty text at position {pos}"
            )));
        }

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_indices: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(vector) = self.cache.get(text).await? {
                self.tracker.track_embedding(text, true);
                vectors[i] = Some(vector);
            } else {
                miss_indices.push(i);
            }
        }
        debug!(
            total = texts.len(),
            cache_hits = texts.len() - miss_indices.len(),
            "embedding batch"
        );

        let groups: Vec<&[usize]> = miss_indices.chunks(self.batch_size).collect();
        let tasks = groups.iter().map(|group| async move {
            let group_texts: Vec<String> = group.iter().map(|&i| texts[i].clone()).collect();
            let group_vectors = self
                .with_retry(|| async {
                    self.provider
                        .embed_batch(&group_texts, self.batch_size)
                        .await
                })
                .await?;

            if group_vectors.len() != group_texts.len() {
                return Err(RetrievalError::Internal(format!(
                    "provider returned {} vectors for {} texts",
                    group_vectors.len(),
                    group_texts.len()
                )));
            }

            // Cache writes happen per group, so sibling groups survive
            // a later group's failure
            for (&i, vector) in group.iter().zip(&group_vectors) {
                self.tracker.track_embedding(&texts[i], false);
                self.cache.set(&texts[i], vector).await?;
            }
            Ok::<_, RetrievalError>(group_vectors)
        });

        let results = future::try_join_all(tasks).await?;
        for (group, group_vectors) in groups.iter().zip(results) {
            for (&i, vector) in group.iter().zip(group_vectors) {
                vectors[i] = Some(vector);
            }
        }

        Ok(vectors
            .into_iter()
            .map(|v| v.unwrap_or_default())
            .collect())
    }

    /// Check provider health
    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }

    /// Retry with exponential backoff on retryable errors only
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!(
                        code = e.error_code(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying embedding call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
