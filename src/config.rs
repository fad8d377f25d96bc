//! Configuration management for the retrieval engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the retrieval engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    pub store: StoreConfig,

    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Embedding cache configuration
    pub cache: CacheConfig,

    /// Token usage tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Reranker configuration
    #[serde(default)]
    pub rerank: RerankConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider backend ("remote" or "local")
    pub provider: String,

    /// Base URL of the remote embeddings API
    pub api_base: String,

    /// API key for the remote provider
    pub api_key: String,

    /// Embedding model name
    pub model: String,

    /// Vector dimensions produced by the model
    pub dimensions: usize,

    /// Local model name (used when provider = "local")
    pub local_model: String,

    /// Maximum texts per provider call
    pub batch_size: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retry ceiling for retryable provider errors
    pub max_retries: u32,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend ("qdrant" or "sqlite")
    pub backend: String,

    /// Qdrant cluster URL
    pub qdrant_url: String,

    /// Qdrant API key
    pub qdrant_api_key: String,

    /// Collection name
    pub collection: String,

    /// Enable the sparse hybrid-search channel on the networked store
    pub hybrid_search: bool,

    /// Path of the embedded SQLite store ("sqlite::memory:" for tests)
    pub sqlite_path: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens (soft limit)
    pub target_tokens: usize,

    /// Maximum chunk size in tokens (hard limit)
    pub max_tokens: usize,

    /// Tokens of overlap between adjacent same-section chunks
    pub overlap_tokens: usize,

    /// Merge chunks under the merge threshold with a same-section peer
    pub merge_small_chunks: bool,

    /// Merge threshold in tokens
    pub merge_threshold_tokens: usize,
}

/// Embedding cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base directory; a model-specific subdirectory is created inside it
    pub dir: PathBuf,

    /// Byte budget before LRU eviction kicks in
    pub size_limit_bytes: u64,
}

/// Token usage tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// JSON file for persisted daily usage; in-memory only when unset
    pub log_path: Option<PathBuf>,

    /// Daily token count that triggers a budget warning
    pub daily_warning_threshold: u64,

    /// Provider price per one million tokens, for cost estimates
    pub cost_per_million_tokens: f64,
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Reranker backend ("remote", "local", or "" to disable)
    pub provider: String,

    /// Base URL of the rerank API
    pub api_base: String,

    /// API key for the rerank API
    pub api_key: String,

    /// Rerank model name
    pub model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            chunking: ChunkingConfig::default(),
            cache: CacheConfig::default(),
            tracking: TrackingConfig::default(),
            rerank: RerankConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "remote".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            local_model: "all-MiniLM-L6-v2".to_string(),
            batch_size: 100,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            qdrant_url: String::new(),
            qdrant_api_key: String::new(),
            collection: "reference_corpus".to_string(),
            hybrid_search: true,
            sqlite_path: "collections/refbase.db".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 500,
            max_tokens: 1000,
            overlap_tokens: 100,
            merge_small_chunks: true,
            merge_threshold_tokens: 100,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/cache"),
            size_limit_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            daily_warning_threshold: 1_000_000,
            cost_per_million_tokens: 0.020,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_base: "https://api.cohere.com/v2".to_string(),
            api_key: String::new(),
            model: "rerank-english-v3.0".to_string(),
            timeout_secs: 30,
        }
    }
}

impl KnowledgeConfig {
    /// Load configuration from a file (json or toml)
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Build configuration from environment variables on top of defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let get = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(v) = get("REFBASE_EMBEDDING_PROVIDER") {
            config.embedding.provider = v;
        }
        if let Some(v) = get("REFBASE_EMBEDDING_API_BASE") {
            config.embedding.api_base = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            config.embedding.api_key = v;
        }
        if let Some(v) = get("REFBASE_EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Some(v) = get("REFBASE_EMBEDDING_DIMENSIONS").and_then(|v| v.parse().ok()) {
            config.embedding.dimensions = v;
        }
        if let Some(v) = get("REFBASE_LOCAL_EMBEDDING_MODEL") {
            config.embedding.local_model = v;
        }

        if let Some(v) = get("REFBASE_VECTOR_STORE") {
            config.store.backend = v;
        }
        if let Some(v) = get("QDRANT_URL") {
            config.store.qdrant_url = v;
        }
        if let Some(v) = get("QDRANT_API_KEY") {
            config.store.qdrant_api_key = v;
        }
        if let Some(v) = get("REFBASE_COLLECTION") {
            config.store.collection = v;
        }
        if let Some(v) = get("REFBASE_HYBRID_SEARCH") {
            config.store.hybrid_search = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Some(v) = get("REFBASE_SQLITE_PATH") {
            config.store.sqlite_path = v;
        }

        if let Some(v) = get("REFBASE_CHUNK_TARGET_TOKENS").and_then(|v| v.parse().ok()) {
            config.chunking.target_tokens = v;
        }
        if let Some(v) = get("REFBASE_CHUNK_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            config.chunking.max_tokens = v;
        }
        if let Some(v) = get("REFBASE_CHUNK_OVERLAP_TOKENS").and_then(|v| v.parse().ok()) {
            config.chunking.overlap_tokens = v;
        }

        if let Some(v) = get("REFBASE_CACHE_DIR") {
            config.cache.dir = PathBuf::from(v);
        }
        if let Some(v) = get("REFBASE_CACHE_SIZE_LIMIT").and_then(|v| v.parse().ok()) {
            config.cache.size_limit_bytes = v;
        }

        if let Some(v) = get("REFBASE_RERANK_PROVIDER") {
            config.rerank.provider = v;
        }
        if let Some(v) = get("COHERE_API_KEY") {
            config.rerank.api_key = v;
        }

        config
    }

    /// Validate the configuration
    ///
    /// Returns a list of missing or invalid fields. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.embedding.provider.as_str() {
            "remote" => {
                if self.embedding.api_key.is_empty() {
                    errors.push("OPENAI_API_KEY is required for the remote embedder".to_string());
                }
                if self.embedding.model.is_empty() {
                    errors.push("embedding model name cannot be empty".to_string());
                }
            }
            "local" => {
                if self.embedding.local_model.is_empty() {
                    errors.push("local embedding model name cannot be empty".to_string());
                }
            }
            other => errors.push(format!("unknown embedding provider: {other}")),
        }

        if self.embedding.dimensions == 0 {
            errors.push("embedding dimensions must be greater than 0".to_string());
        }
        if self.embedding.batch_size == 0 {
            errors.push("embedding batch size must be greater than 0".to_string());
        }

        match self.store.backend.as_str() {
            "qdrant" => {
                if self.store.qdrant_url.is_empty() {
                    errors.push("QDRANT_URL is required when using the qdrant backend".to_string());
                }
            }
            "sqlite" => {
                if self.store.sqlite_path.is_empty() {
                    errors.push("sqlite store path cannot be empty".to_string());
                }
            }
            other => errors.push(format!("unknown vector store backend: {other}")),
        }

        if self.store.collection.is_empty() {
            errors.push("collection name cannot be empty".to_string());
        }

        if self.chunking.max_tokens == 0 {
            errors.push("chunk max_tokens must be greater than 0".to_string());
        }
        if self.chunking.target_tokens > self.chunking.max_tokens {
            errors.push("chunk target_tokens must not exceed max_tokens".to_string());
        }
        if self.chunking.overlap_tokens >= self.chunking.target_tokens
            && self.chunking.target_tokens > 0
        {
            errors.push("chunk overlap_tokens must be less than target_tokens".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_requires_credentials() {
        let config = KnowledgeConfig::default();
        let errors = config.validate();
        // Remote provider and qdrant backend both need credentials
        assert!(errors.iter().any(|e| e.contains("OPENAI_API_KEY")));
        assert!(errors.iter().any(|e| e.contains("QDRANT_URL")));
    }

    #[test]
    fn test_valid_sqlite_config() {
        let mut config = KnowledgeConfig::default();
        config.embedding.api_key = "sk-test".to_string();
        config.store.backend = "sqlite".to_string();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_chunking_bounds_validation() {
        let mut config = KnowledgeConfig::default();
        config.embedding.api_key = "sk-test".to_string();
        config.store.backend = "sqlite".to_string();

        config.chunking.target_tokens = 2000;
        config.chunking.max_tokens = 1000;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("target_tokens")));

        config.chunking.target_tokens = 500;
        config.chunking.overlap_tokens = 600;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("overlap_tokens")));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = KnowledgeConfig::default();
        config.embedding.provider = "quantum".to_string();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("unknown embedding provider")));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = KnowledgeConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: KnowledgeConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.embedding.model, config.embedding.model);
        assert_eq!(parsed.chunking.max_tokens, config.chunking.max_tokens);
    }
}
