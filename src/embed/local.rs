//! Local embedding provider backed by fastembed
//!
//! Compiled in behind the `local-embeddings` feature. Model inference is
//! synchronous, so it runs on the blocking pool; the scheduler thread
//! never waits on compute.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Embedder running a fastembed model in-process
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_id, dimensions) = match config.local_model.as_str() {
            "all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            other => {
                return Err(RetrievalError::Config(format!(
                    "unsupported local embedding model: {other}"
                )))
            }
        };

        info!(model = %config.local_model, "loading local embedding model");
        let model = TextEmbedding::try_new(
            InitOptions::new(model_id).with_show_download_progress(false),
        )
        .map_err(|e| RetrievalError::Config(format!("failed to load local model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: config.local_model.clone(),
            dimensions,
        })
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RetrievalError::Internal("local model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| RetrievalError::Internal(format!("local inference failed: {e}")))
        })
        .await
        .map_err(|e| RetrievalError::Internal(format!("inference task failed: {e}")))?
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vectors = self.encode(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::Internal("model returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RetrievalError::InvalidInput(format!(
                "cannot embed empty text at position {pos}"
            )));
        }

        let batch_size = batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(batch_size) {
            vectors.extend(self.encode(group.to_vec()).await?);
        }
        Ok(vectors)
    }
}
