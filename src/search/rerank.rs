//! Result reranking over a rerank API or a local cross-encoder

use super::models::SearchResult;
use crate::config::RerankConfig;
use crate::error::{Result, RetrievalError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Trait for rerank backends
///
/// Reranking preserves every field of each input result except `score`,
/// which is replaced with the rerank model's output. Results come back
/// sorted descending; `top_n` optionally truncates.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_n: Option<usize>,
    ) -> Result<Vec<SearchResult>>;

    fn model_name(&self) -> &str;
}

/// Create a reranker from configuration; empty provider disables it
pub fn create_reranker(config: &RerankConfig) -> Result<Option<Arc<dyn Reranker>>> {
    match config.provider.as_str() {
        "" => Ok(None),
        "remote" => Ok(Some(Arc::new(RemoteReranker::new(config)?))),
        #[cfg(feature = "local-reranker")]
        "local" => Ok(Some(Arc::new(local::LocalReranker::new(config)?))),
        #[cfg(not(feature = "local-reranker"))]
        "local" => Err(RetrievalError::Config(
            "local reranking requires the `local-reranker` feature".to_string(),
        )),
        other => Err(RetrievalError::Config(format!(
            "unknown rerank provider: {other}"
        ))),
    }
}

/// Client for a Cohere-style `/rerank` endpoint
pub struct RemoteReranker {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankEntry>,
}

#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    relevance_score: f32,
}

impl RemoteReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RetrievalError::Config(
                "remote reranker requires an API key".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Reranker for RemoteReranker {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_n: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        if results.is_empty() {
            return Ok(results);
        }

        let documents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        let response = self
            .client
            .post(format!("{}/rerank", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "query": query,
                "documents": documents,
                "top_n": top_n.unwrap_or(documents.len()),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => RetrievalError::Auth("rerank provider rejected credentials".to_string()),
                429 => RetrievalError::RateLimited("rerank provider rate limit".to_string()),
                s => RetrievalError::Internal(format!("rerank provider returned status {s}")),
            });
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Internal(format!("invalid rerank response: {e}")))?;

        // The API returns entries sorted by relevance; map indices back
        // onto the originals, replacing only the score
        let mut reranked = Vec::with_capacity(parsed.results.len());
        for entry in parsed.results {
            let original = results.get(entry.index).ok_or_else(|| {
                RetrievalError::Internal(format!(
                    "rerank returned out-of-range index {}",
                    entry.index
                ))
            })?;
            let mut result = original.clone();
            result.score = entry.relevance_score;
            reranked.push(result);
        }

        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(top_n) = top_n {
            reranked.truncate(top_n);
        }

        debug!(results = reranked.len(), "reranked results");
        Ok(reranked)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(feature = "local-reranker")]
mod local {
    use super::*;
    use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
    use std::sync::Mutex;

    /// Cross-encoder reranker running in-process
    ///
    /// Inference is synchronous and runs on the blocking pool.
    pub struct LocalReranker {
        model: Arc<Mutex<TextRerank>>,
        model_name: String,
    }

    impl LocalReranker {
        pub fn new(config: &RerankConfig) -> Result<Self> {
            let model = TextRerank::try_new(
                RerankInitOptions::new(RerankerModel::BGERerankerBase)
                    .with_show_download_progress(false),
            )
            .map_err(|e| RetrievalError::Config(format!("failed to load reranker model: {e}")))?;

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                model_name: if config.model.is_empty() {
                    "bge-reranker-base".to_string()
                } else {
                    config.model.clone()
                },
            })
        }
    }

    #[async_trait]
    impl Reranker for LocalReranker {
        async fn rerank(
            &self,
            query: &str,
            results: Vec<SearchResult>,
            top_n: Option<usize>,
        ) -> Result<Vec<SearchResult>> {
            if results.is_empty() {
                return Ok(results);
            }

            let query = query.to_string();
            let documents: Vec<String> = results.iter().map(|r| r.content.clone()).collect();
            let model = Arc::clone(&self.model);

            let scored = tokio::task::spawn_blocking(move || {
                let model = model.lock().map_err(|_| {
                    RetrievalError::Internal("reranker model lock poisoned".to_string())
                })?;
                let docs: Vec<&String> = documents.iter().collect();
                model
                    .rerank(&query, docs, false, None)
                    .map_err(|e| RetrievalError::Internal(format!("rerank inference failed: {e}")))
            })
            .await
            .map_err(|e| RetrievalError::Internal(format!("rerank task failed: {e}")))??;

            let mut reranked = Vec::with_capacity(scored.len());
            for entry in scored {
                let original = results.get(entry.index).ok_or_else(|| {
                    RetrievalError::Internal(format!(
                        "rerank returned out-of-range index {}",
                        entry.index
                    ))
                })?;
                let mut result = original.clone();
                result.score = entry.score;
                reranked.push(result);
            }

            reranked
                .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            if let Some(top_n) = top_n {
                reranked.truncate(top_n);
            }
            Ok(reranked)
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }
}
