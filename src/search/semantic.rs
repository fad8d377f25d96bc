//! Semantic retrieval engine: embed, search, fuse, rerank

use super::bm25::Bm25Searcher;
use super::fusion::reciprocal_rank_fusion;
use super::models::SearchResult;
use super::rerank::Reranker;
use crate::embed::service::EmbeddingService;
use crate::error::Result;
use crate::store::{Filter, VectorStore};
use std::sync::Arc;
use tracing::{debug, error};

/// Options for one retrieval request
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub n_results: usize,
    pub filter: Option<Filter>,
    pub score_threshold: f32,
    pub hybrid: bool,
    pub rerank: bool,
    pub rerank_top_n: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            n_results: 10,
            filter: None,
            score_threshold: 0.0,
            hybrid: false,
            rerank: false,
            rerank_top_n: None,
        }
    }
}

/// Query-to-results retrieval combining the embedding layer, the vector
/// store, the lexical index, and the reranker
///
/// Reentrant: holds no mutable state between requests. Downstream
/// errors degrade to an empty result list; a trimmed-empty query is
/// never an error.
pub struct SemanticSearcher {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    lexical: Arc<Bm25Searcher>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl SemanticSearcher {
    pub fn new(
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        lexical: Arc<Bm25Searcher>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        Self {
            embeddings,
            store,
            lexical,
            reranker,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingService> {
        &self.embeddings
    }

    pub fn lexical(&self) -> &Arc<Bm25Searcher> {
        &self.lexical
    }

    /// Rebuild the lexical index from the store's current chunk set
    pub async fn rebuild_lexical_index(&self) -> Result<usize> {
        let texts = self.store.list_texts().await?;
        let docs: Vec<super::bm25::LexicalDoc> = texts
            .into_iter()
            .map(|(id, content)| super::bm25::LexicalDoc { id, content })
            .collect();
        self.lexical.build(&docs).await;
        Ok(docs.len())
    }

    /// Search for relevant content
    ///
    /// An empty (after trim) query returns an empty list. Errors from
    /// the embedding layer, the store, or the reranker are logged with
    /// a query prefix and degrade to an empty list; partial results are
    /// never silently passed off as complete.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        match self.try_search(query, options).await {
            Ok(results) => results,
            Err(e) => {
                let prefix: String = query.chars().take(50).collect();
                error!(query = %prefix, code = e.error_code(), error = %e, "search failed");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query_vector = self.embeddings.embed(query).await?;

        let points = self
            .store
            .search(
                &query_vector,
                options.n_results,
                options.filter.as_ref(),
                options.score_threshold,
            )
            .await?;
        let mut results: Vec<SearchResult> =
            points.into_iter().map(SearchResult::from_point).collect();

        if options.hybrid && self.lexical.is_indexed().await {
            let lexical_hits = self.lexical.search(query, options.n_results).await;
            debug!(
                dense = results.len(),
                lexical = lexical_hits.len(),
                "fusing hybrid results"
            );
            results = reciprocal_rank_fusion(results, lexical_hits, options.n_results);
        }

        if options.rerank {
            if let Some(reranker) = &self.reranker {
                results = reranker
                    .rerank(query, results, options.rerank_top_n)
                    .await?;
            }
        }

        Ok(results)
    }
}
