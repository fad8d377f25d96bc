//! refbase: retrieval engine for technical reference corpora
//!
//! Ingests standards, handbooks, and specifications, carves them into
//! provenance-tagged chunks, vectorizes them through a cache-aware
//! embedding layer, persists them in a dual store (dense vectors plus a
//! BM25 keyword index), and answers hybrid retrieval queries shaped by
//! workflow strategies.
//!
//! # Example
//!
//! ```rust,no_run
//! use refbase::{KnowledgeConfig, KnowledgeService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = KnowledgeConfig::from_env();
//!     let service = KnowledgeService::new(config).await?;
//!
//!     let results = service
//!         .handle("search", serde_json::json!({
//!             "query": "system requirements review",
//!             "n_results": 5,
//!         }))
//!         .await;
//!
//!     println!("{results:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod model;
pub mod ops;
pub mod search;
pub mod store;
pub mod util;

// Re-export main types
pub use config::{
    CacheConfig, ChunkingConfig, EmbeddingConfig, KnowledgeConfig, RerankConfig, StoreConfig,
    TrackingConfig,
};
pub use embed::cache::{EmbeddingCache, EmbeddingCacheStats};
pub use embed::service::EmbeddingService;
pub use embed::tracker::{DayUsage, TokenTracker};
pub use embed::{create_embedder, Embedder};
pub use error::{ErrorEnvelope, Result, RetrievalError};
pub use ingest::chunker::HierarchicalChunker;
pub use ingest::markdown::MarkdownParser;
pub use ingest::pipeline::{BatchReport, IngestionPipeline, IngestionReport};
pub use ingest::{DocumentParser, ElementKind, ParsedDocument, ParsedElement};
pub use model::{Chunk, ChunkType, DocumentMetadata, DocumentType, Normativity};
pub use ops::{operations, KnowledgeService, OperationDef};
pub use search::bm25::{Bm25Searcher, LexicalDoc, LexicalHit};
pub use search::citation::format_citation;
pub use search::models::SearchResult;
pub use search::rerank::{create_reranker, Reranker};
pub use search::semantic::{SearchOptions, SemanticSearcher};
pub use search::strategies::{SearchQuery, SearchStrategy, WorkflowParams};
pub use search::workflow::WorkflowSearcher;
pub use store::{create_store, Filter, FilterValue, ScoredPoint, StoreStats, VectorStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
