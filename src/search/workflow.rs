//! Workflow search orchestration over the strategy layer

use super::semantic::{SearchOptions, SemanticSearcher};
use super::strategies::{SearchStrategy, WorkflowParams};
use crate::error::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Orchestrates workflow-specific searches
///
/// Fixed template around an interchangeable strategy:
/// 1. preprocess query (strategy)
/// 2. retrieve (shared engine, original query + strategy filters)
/// 3. adjust ranking (strategy)
/// 4. format output (strategy)
///
/// Output always carries `result_type` and `total_results`; any error
/// collapses into an error-typed output rather than propagating.
pub struct WorkflowSearcher {
    searcher: Arc<SemanticSearcher>,
    strategy: Box<dyn SearchStrategy>,
}

impl WorkflowSearcher {
    pub fn new(searcher: Arc<SemanticSearcher>, strategy: Box<dyn SearchStrategy>) -> Self {
        Self { searcher, strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Execute the workflow template
    pub async fn search(
        &self,
        query: &str,
        params: &WorkflowParams,
        n_results: usize,
        score_threshold: f32,
    ) -> Value {
        match self.try_search(query, params, n_results, score_threshold).await {
            Ok(output) => output,
            Err(e) => {
                error!(
                    strategy = self.strategy.name(),
                    code = e.error_code(),
                    error = %e,
                    "workflow search failed"
                );
                json!({
                    "result_type": "error",
                    "error": e.to_string(),
                    "total_results": 0,
                })
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        params: &WorkflowParams,
        n_results: usize,
        score_threshold: f32,
    ) -> Result<Value> {
        let search_query = self.strategy.preprocess_query(query, params).await;
        debug!(
            strategy = self.strategy.name(),
            expanded = search_query.expanded_terms.len(),
            facets = search_query.facets.len(),
            "preprocessed workflow query"
        );

        if let Some(filter) = &search_query.filters {
            filter.validate()?;
        }

        let options = SearchOptions {
            n_results,
            filter: search_query.filters.clone(),
            score_threshold,
            ..SearchOptions::default()
        };
        let results = self.searcher.search(&search_query.original, &options).await;
        debug!(results = results.len(), "workflow retrieval complete");

        let ranked = self.strategy.adjust_ranking(results);
        let mut output = self.strategy.format_output(&ranked, params);

        // Standard fields are guaranteed regardless of strategy
        if let Value::Object(map) = &mut output {
            map.entry("total_results".to_string())
                .or_insert_with(|| json!(ranked.len()));
        }

        Ok(output)
    }
}
