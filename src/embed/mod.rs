//! Embedding providers, cache, and the composed embedding service

pub mod cache;
#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod remote;
pub mod service;
pub mod tracker;

use crate::config::KnowledgeConfig;
use crate::error::{Result, RetrievalError};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding providers
///
/// Implementations convert text into fixed-dimension dense vectors.
/// Credentials must never appear in error messages.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality of the vectors this provider produces
    fn dimensions(&self) -> usize;

    /// Model identifier, used for cache partitioning
    fn model_name(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts, preserving order 1:1 with the input
    ///
    /// Texts are sent in groups of at most `batch_size` to respect
    /// provider limits. Partial failure of a group fails the whole call;
    /// the caller retries.
    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;

    /// Check that the provider is reachable and producing vectors of the
    /// declared dimension
    async fn health_check(&self) -> bool {
        match self.embed("test").await {
            Ok(v) => v.len() == self.dimensions(),
            Err(_) => false,
        }
    }
}

/// Create an embedder from configuration
///
/// Local backends are compiled in behind the `local-embeddings` feature;
/// selecting one in a build without the feature is a `config_error`.
pub fn create_embedder(config: &KnowledgeConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider.as_str() {
        "remote" => Ok(Arc::new(remote::RemoteEmbedder::new(&config.embedding)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(local::LocalEmbedder::new(&config.embedding)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(RetrievalError::Config(
            "local embeddings require the `local-embeddings` feature".to_string(),
        )),
        other => Err(RetrievalError::Config(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{automock, predicate};

    #[automock]
    #[async_trait]
    #[allow(dead_code)]
    pub trait EmbedderApi: Send + Sync {
        async fn embed(&self, text: &str) -> Result<Vec<f32>>;
        async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;
    }

    #[tokio::test]
    async fn test_mock_embedder_contract() {
        let mut mock = MockEmbedderApi::new();
        mock.expect_embed()
            .with(predicate::eq("what is a system?"))
            .times(1)
            .returning(|_| Ok(vec![0.1, 0.2, 0.3]));

        let vector = mock.embed("what is a system?").await.unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let mut config = KnowledgeConfig::default();
        config.embedding.provider = "quantum".to_string();
        let err = match create_embedder(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.error_code(), "config_error");
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn test_factory_rejects_local_without_feature() {
        let mut config = KnowledgeConfig::default();
        config.embedding.provider = "local".to_string();
        let err = match create_embedder(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.error_code(), "config_error");
    }

    #[test]
    fn test_factory_builds_remote() {
        let mut config = KnowledgeConfig::default();
        config.embedding.api_key = "sk-test".to_string();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }
}
