//! Remote embedding provider over the OpenAI-compatible embeddings API

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Client for an OpenAI-compatible `/embeddings` endpoint
pub struct RemoteEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl RemoteEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RetrievalError::Config(
                "remote embedder requires an API key".to_string(),
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
            dimensions: config.dimensions,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.api_base)
    }

    /// Map an HTTP status to the error taxonomy without echoing the body
    /// verbatim into auth-related messages
    fn status_error(status: reqwest::StatusCode, body: &str) -> RetrievalError {
        match status.as_u16() {
            400 | 422 => RetrievalError::InvalidInput(format!("provider rejected input: {body}")),
            401 | 403 => RetrievalError::Auth("embedding provider rejected credentials".to_string()),
            408 => RetrievalError::Timeout("embedding request timed out".to_string()),
            429 => RetrievalError::RateLimited("embedding provider rate limit".to_string()),
            s if s >= 500 => RetrievalError::Internal(format!("provider error (status {s})")),
            s => RetrievalError::Internal(format!("unexpected provider status {s}")),
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input,
        };

        let response = timeout(
            self.timeout,
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| RetrievalError::Timeout("embedding request timed out".to_string()))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = Self::status_error(status, &body);
            error!(status = status.as_u16(), code = err.error_code(), "embedding request failed");
            return Err(err);
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Internal(format!("invalid provider response: {e}")))?;

        if parsed.data.len() != input.len() {
            return Err(RetrievalError::Internal(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }

        // The API may return entries out of order; index restores it
        let mut ordered: Vec<Vec<f32>> = vec![Vec::new(); input.len()];
        for item in parsed.data {
            if item.index >= ordered.len() {
                return Err(RetrievalError::Internal(format!(
                    "provider returned out-of-range index {}",
                    item.index
                )));
            }
            ordered[item.index] = item.embedding;
        }

        for vector in &ordered {
            if vector.len() != self.dimensions {
                return Err(RetrievalError::Internal(format!(
                    "provider returned {}-dimensional vector, expected {}",
                    vector.len(),
                    self.dimensions
                )));
            }
        }

        Ok(ordered)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RetrievalError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        debug!(chars = text.len(), "embedding single text");
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::Internal("provider returned no embedding".to_string()))
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
            debug!(batch = group.len(), "embedding batch");
            vectors.extend(self.request(group).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_base: String) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "remote".to_string(),
            api_base,
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 3,
            local_model: String::new(),
            batch_size: 2,
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    fn embedding_body(vectors: &[Vec<f32>]) -> serde_json::Value {
        json!({
            "data": vectors
                .iter()
                .enumerate()
                .map(|(i, v)| json!({"embedding": v, "index": i}))
                .collect::<Vec<_>>(),
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 2, "total_tokens": 2},
        })
    }

    #[tokio::test]
    async fn test_embed_single() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.1, 0.2, 0.3]])),
            )
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_empty_text_is_invalid_input() {
        let server = MockServer::start().await;
        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let err = embedder.embed("   ").await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_input");
    }

    #[tokio::test]
    async fn test_batch_preserves_order_across_groups() {
        let server = MockServer::start().await;
        // batch_size = 2, so four texts arrive as two requests
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[
                vec![1.0, 0.0, 0.0],
                vec![2.0, 0.0, 0.0],
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["c", "d"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[
                vec![3.0, 0.0, 0.0],
                vec![4.0, 0.0, 0.0],
            ])))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let vectors = embedder.embed_batch(&texts, 2).await.unwrap();

        assert_eq!(vectors.len(), 4);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
    }

    #[tokio::test]
    async fn test_out_of_order_indices_are_restored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [2.0, 0.0, 0.0], "index": 1},
                    {"embedding": [1.0, 0.0, 0.0], "index": 0},
                ],
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let texts = vec!["a".to_string(), "b".to_string()];
        let vectors = embedder.embed_batch(&texts, 10).await.unwrap();
        assert_eq!(vectors[0][0], 1.0);
        assert_eq!(vectors[1][0], 2.0);
    }

    #[tokio::test]
    async fn test_auth_error_has_no_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key sk-leaked"))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert_eq!(err.error_code(), "auth_error");
        assert!(!err.to_string().contains("sk-"));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert_eq!(err.error_code(), "rate_limited");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.1, 0.2]])),
            )
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert_eq!(err.error_code(), "internal_error");
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[vec![0.1, 0.2, 0.3]])),
            )
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&test_config(server.uri())).unwrap();
        assert!(embedder.health_check().await);
    }
}
