//! Operations exposed to the dispatch collaborator
//!
//! Each operation has a stable name, a JSON schema, and a typed
//! handler. The dispatch surface (stdio framing, CLI) lives outside
//! this crate and only serializes these inputs and outputs.

use crate::config::KnowledgeConfig;
use crate::embed::cache::EmbeddingCache;
use crate::embed::service::EmbeddingService;
use crate::embed::tracker::TokenTracker;
use crate::embed::create_embedder;
use crate::error::{ErrorEnvelope, Result, RetrievalError};
use crate::search::bm25::Bm25Searcher;
use crate::search::rerank::create_reranker;
use crate::search::semantic::{SearchOptions, SemanticSearcher};
use crate::search::strategies::explore::ExploreStrategy;
use crate::search::strategies::plan::PlanStrategy;
use crate::search::strategies::rcca::RccaStrategy;
use crate::search::strategies::trade::TradeStudyStrategy;
use crate::search::strategies::{SearchStrategy, WorkflowParams};
use crate::search::workflow::WorkflowSearcher;
use crate::store::{create_store, Filter, VectorStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Declaration of one operation: name, description, input schema
#[derive(Debug, Clone)]
pub struct OperationDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// All operations the core exposes
pub fn operations() -> Vec<OperationDef> {
    let common = |extra: Value| {
        let mut properties = json!({
            "query": {"type": "string", "description": "Natural language search query"},
            "n_results": {"type": "integer", "minimum": 1, "default": 10},
            "score_threshold": {"type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.0},
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut properties, extra) {
            base.extend(extra);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["query"],
        })
    };

    vec![
        OperationDef {
            name: "search",
            description: "Hybrid semantic search over the reference corpus",
            input_schema: common(json!({
                "filter": {"type": "object", "description": "Metadata filter over document_id, document_type, chunk_type, normative, clause_number"},
                "hybrid": {"type": "boolean", "default": false},
                "rerank": {"type": "boolean", "default": false},
            })),
        },
        OperationDef {
            name: "stats",
            description: "Vector store collection statistics",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        OperationDef {
            name: "rcca",
            description: "Failure analysis retrieval (root cause corrective action)",
            input_schema: common(json!({
                "project_id": {"type": "string"},
            })),
        },
        OperationDef {
            name: "trade",
            description: "Trade study retrieval comparing alternatives against criteria",
            input_schema: common(json!({
                "alternatives": {"type": "array", "items": {"type": "string"}},
                "criteria": {"type": "array", "items": {"type": "string"}},
            })),
        },
        OperationDef {
            name: "explore",
            description: "Multi-facet topic exploration",
            input_schema: common(json!({
                "facets": {"type": "array", "items": {"type": "string"}},
            })),
        },
        OperationDef {
            name: "plan",
            description: "Planning support retrieval (templates, risks, lessons, precedents)",
            input_schema: common(json!({
                "category": {"type": "string", "enum": ["templates", "risks", "lessons_learned", "precedents"]},
                "categories": {"type": "array", "items": {"type": "string"}},
            })),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_n")]
    n_results: usize,
    #[serde(default)]
    score_threshold: f32,
    #[serde(default)]
    filter: Option<Filter>,
    #[serde(default)]
    hybrid: bool,
    #[serde(default)]
    rerank: bool,
}

#[derive(Debug, Deserialize)]
struct WorkflowRequest {
    query: String,
    #[serde(default = "default_workflow_n")]
    n_results: usize,
    #[serde(default)]
    score_threshold: f32,
    #[serde(flatten)]
    params: WorkflowParams,
}

fn default_n() -> usize {
    10
}

fn default_workflow_n() -> usize {
    20
}

/// Composition root: owns the embedding layer, the store, and the
/// retrieval engine, and dispatches operations to them
pub struct KnowledgeService {
    config: KnowledgeConfig,
    searcher: Arc<SemanticSearcher>,
}

impl KnowledgeService {
    /// Wire up the service from configuration
    ///
    /// Fails fast on invalid configuration; store fallback happens
    /// inside the factory.
    pub async fn new(config: KnowledgeConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(RetrievalError::Config(errors.join("; ")));
        }

        let provider = create_embedder(&config)?;
        let cache = EmbeddingCache::open(
            &config.cache.dir,
            provider.model_name(),
            config.cache.size_limit_bytes,
        )
        .await?;
        let tracker = Arc::new(TokenTracker::new(&config.tracking, provider.model_name()));
        let embeddings = Arc::new(EmbeddingService::new(
            provider,
            cache,
            tracker,
            config.embedding.batch_size,
            config.embedding.max_retries,
        ));

        let store: Arc<dyn VectorStore> = create_store(&config).await?;
        let reranker = create_reranker(&config.rerank)?;

        let searcher = Arc::new(SemanticSearcher::new(
            embeddings,
            store,
            Arc::new(Bm25Searcher::new()),
            reranker,
        ));

        info!("knowledge service ready");
        Ok(Self { config, searcher })
    }

    /// Build a service from preassembled parts (used by tests and the
    /// ingest driver)
    pub fn from_parts(config: KnowledgeConfig, searcher: Arc<SemanticSearcher>) -> Self {
        Self { config, searcher }
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }

    pub fn searcher(&self) -> &Arc<SemanticSearcher> {
        &self.searcher
    }

    /// Dispatch an operation by name
    ///
    /// Unknown names and malformed arguments come back as error
    /// envelopes, never panics.
    pub async fn handle(&self, operation: &str, args: Value) -> std::result::Result<Value, ErrorEnvelope> {
        match operation {
            "search" => self.handle_search(args).await,
            "stats" => self.handle_stats().await,
            "rcca" => self.handle_workflow(args, Box::new(RccaStrategy)).await,
            "trade" => self.handle_workflow(args, Box::new(TradeStudyStrategy)).await,
            "explore" => self.handle_workflow(args, Box::new(ExploreStrategy)).await,
            "plan" => self.handle_workflow(args, Box::new(PlanStrategy)).await,
            other => Err(RetrievalError::NotFound(format!("unknown operation: {other}")).to_envelope()),
        }
    }

    async fn handle_search(&self, args: Value) -> std::result::Result<Value, ErrorEnvelope> {
        let request: SearchRequest = serde_json::from_value(args)
            .map_err(|e| RetrievalError::InvalidInput(format!("bad search arguments: {e}")).to_envelope())?;

        if let Some(filter) = &request.filter {
            filter.validate().map_err(|e| e.to_envelope())?;
        }

        let options = SearchOptions {
            n_results: request.n_results,
            filter: request.filter,
            score_threshold: request.score_threshold,
            hybrid: request.hybrid,
            rerank: request.rerank,
            rerank_top_n: Some(request.n_results),
        };
        let results = self.searcher.search(&request.query, &options).await;

        Ok(json!({
            "results": results.iter().map(|r| r.to_output()).collect::<Vec<_>>(),
            "total_results": results.len(),
        }))
    }

    async fn handle_stats(&self) -> std::result::Result<Value, ErrorEnvelope> {
        let stats = self
            .searcher
            .store()
            .get_stats()
            .await
            .map_err(|e| e.to_envelope())?;
        let cache_stats = self
            .searcher
            .embeddings()
            .cache()
            .stats()
            .await
            .map_err(|e| e.to_envelope())?;

        Ok(json!({
            "collection": stats,
            "embedding_cache": cache_stats,
            "lexical_documents": self.searcher.lexical().document_count().await,
        }))
    }

    async fn handle_workflow(
        &self,
        args: Value,
        strategy: Box<dyn SearchStrategy>,
    ) -> std::result::Result<Value, ErrorEnvelope> {
        let request: WorkflowRequest = serde_json::from_value(args)
            .map_err(|e| RetrievalError::InvalidInput(format!("bad workflow arguments: {e}")).to_envelope())?;

        let workflow = WorkflowSearcher::new(Arc::clone(&self.searcher), strategy);
        Ok(workflow
            .search(
                &request.query,
                &request.params,
                request.n_results,
                request.score_threshold,
            )
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::embed::Embedder;
    use crate::model::{Chunk, ChunkType, DocumentType, Normativity};
    use crate::store::sqlite::SqliteStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn dimensions(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "m-test"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String], _b: usize) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    fn chunk(text: &str, normative: Normativity) -> Chunk {
        let now = Utc::now();
        Chunk {
            id: Uuid::new_v4(),
            document_id: "doc-1".to_string(),
            document_title: "Standard".to_string(),
            document_type: DocumentType::Standard,
            content_hash: crate::util::hashing::content_hash(text),
            token_count: 6,
            text: text.to_string(),
            chunk_type: ChunkType::Text,
            section_hierarchy: vec!["1".to_string()],
            section_title: "1 Scope".to_string(),
            clause_number: Some("1".to_string()),
            page_numbers: vec![2],
            has_overlap: false,
            caption: None,
            normative,
            embedding: vec![1.0, 0.0, 0.0],
            embedding_model: "m-test".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn service() -> (KnowledgeService, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = KnowledgeConfig::default();
        config.store.backend = "sqlite".to_string();
        config.store.sqlite_path = "sqlite::memory:".to_string();
        config.embedding.dimensions = 3;

        let cache = EmbeddingCache::open(dir.path(), "m-test", 1024 * 1024)
            .await
            .unwrap();
        let tracker = Arc::new(TokenTracker::new(&TrackingConfig::default(), "m-test"));
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(FixedEmbedder),
            cache,
            tracker,
            16,
            0,
        ));

        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        store
            .add_chunks(&[
                chunk("The review SHALL be independent.", Normativity::Normative),
                chunk("NOTE: informal guidance only.", Normativity::Informative),
            ])
            .await
            .unwrap();

        let searcher = Arc::new(SemanticSearcher::new(
            embeddings,
            store,
            Arc::new(Bm25Searcher::new()),
            None,
        ));
        (KnowledgeService::from_parts(config, searcher), dir)
    }

    #[test]
    fn test_operation_catalog() {
        let ops = operations();
        let names: Vec<_> = ops.iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["search", "stats", "rcca", "trade", "explore", "plan"]);
        for op in &ops {
            assert_eq!(op.input_schema["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_search_operation() {
        let (service, _dir) = service().await;
        let output = service
            .handle("search", json!({"query": "independent review", "n_results": 5}))
            .await
            .unwrap();

        assert_eq!(output["total_results"], 2);
        assert!(output["results"][0]["citation"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let (service, _dir) = service().await;
        let output = service
            .handle(
                "search",
                json!({"query": "review", "filter": {"normative": true}}),
            )
            .await
            .unwrap();

        assert_eq!(output["total_results"], 1);
        assert_eq!(output["results"][0]["normative"], true);
    }

    #[tokio::test]
    async fn test_invalid_filter_field_is_error_envelope() {
        let (service, _dir) = service().await;
        let err = service
            .handle("search", json!({"query": "q", "filter": {"bogus": "x"}}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "invalid_input");
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (service, _dir) = service().await;
        let err = service.handle("summon", json!({})).await.unwrap_err();
        assert_eq!(err.error_code, "not_found");
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid_input() {
        let (service, _dir) = service().await;
        let err = service.handle("search", json!({})).await.unwrap_err();
        assert_eq!(err.error_code, "invalid_input");
    }

    #[tokio::test]
    async fn test_stats_operation() {
        let (service, _dir) = service().await;
        let output = service.handle("stats", json!({})).await.unwrap();

        assert_eq!(output["collection"]["total_chunks"], 2);
        assert_eq!(output["collection"]["config"]["vector_size"], 3);
        assert_eq!(output["embedding_cache"]["model"], "m-test");
    }

    #[tokio::test]
    async fn test_workflow_operations_carry_result_type() {
        let (service, _dir) = service().await;

        let cases = [
            ("rcca", "rcca_analysis"),
            ("trade", "trade_analysis"),
            ("explore", "explore_analysis"),
            ("plan", "plan_analysis"),
        ];
        for (op, result_type) in cases {
            let output = service
                .handle(op, json!({"query": "verification review"}))
                .await
                .unwrap();
            assert_eq!(output["result_type"], result_type, "operation {op}");
            assert!(output["total_results"].is_u64(), "operation {op}");
        }
    }

    #[tokio::test]
    async fn test_explore_operation_with_facets() {
        let (service, _dir) = service().await;
        let output = service
            .handle(
                "explore",
                json!({"query": "verification", "facets": ["definitions", "standards"]}),
            )
            .await
            .unwrap();

        let coverage = output["facet_coverage"].as_object().unwrap();
        assert_eq!(coverage.len(), 2);
    }
}
