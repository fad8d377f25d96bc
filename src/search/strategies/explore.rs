//! Multi-facet exploration strategy

use super::{boost, sort_by_score, SearchQuery, SearchStrategy, WorkflowParams};
use crate::search::models::SearchResult;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Strategy for broad exploration of a topic across facets
///
/// Default facets cover four perspectives: definitions, examples,
/// standards (normative content), and best practices. Each result is
/// binned into exactly one facet by precedence: definition > example >
/// normative > guidance > best_practices.
pub struct ExploreStrategy;

impl ExploreStrategy {
    pub const DEFAULT_FACETS: [&'static str; 4] =
        ["definitions", "examples", "standards", "best_practices"];

    fn facets_from(params: &WorkflowParams) -> Vec<String> {
        match &params.facets {
            Some(facets) if !facets.is_empty() => facets.clone(),
            _ => Self::DEFAULT_FACETS.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn facet_for(result: &SearchResult) -> &'static str {
        let chunk_type = result.chunk_type.to_lowercase();
        if chunk_type == "definition" {
            "definitions"
        } else if chunk_type == "example" {
            "examples"
        } else if result.normative {
            "standards"
        } else if chunk_type == "guidance" {
            "best_practices"
        } else {
            "best_practices"
        }
    }
}

#[async_trait]
impl SearchStrategy for ExploreStrategy {
    fn name(&self) -> &'static str {
        "explore"
    }

    async fn preprocess_query(&self, query: &str, params: &WorkflowParams) -> SearchQuery {
        SearchQuery {
            original: query.to_string(),
            expanded_terms: Vec::new(),
            filters: params.filters.clone(),
            facets: Self::facets_from(params),
        }
    }

    fn adjust_ranking(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        for result in &mut results {
            let chunk_type = result.chunk_type.to_lowercase();
            if chunk_type == "definition" {
                result.score = boost(result.score, 1.20);
            } else if chunk_type == "example" {
                result.score = boost(result.score, 1.15);
            } else if result.normative {
                result.score = boost(result.score, 1.10);
            } else if chunk_type == "guidance" {
                result.score = boost(result.score, 1.10);
            }
        }
        sort_by_score(&mut results);
        results
    }

    fn format_output(&self, results: &[SearchResult], params: &WorkflowParams) -> Value {
        let facets = Self::facets_from(params);

        let mut by_facet: Map<String, Value> = facets
            .iter()
            .map(|f| (f.clone(), Value::Array(Vec::new())))
            .collect();

        for result in results {
            let facet = Self::facet_for(result);
            if let Some(Value::Array(bucket)) = by_facet.get_mut(facet) {
                bucket.push(result.to_output());
            }
        }

        let facet_coverage: Map<String, Value> = facets
            .iter()
            .map(|f| {
                let count = by_facet
                    .get(f)
                    .and_then(|v| v.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0);
                (f.clone(), json!(count))
            })
            .collect();

        json!({
            "result_type": "explore_analysis",
            "results_by_facet": Value::Object(by_facet),
            "facet_coverage": Value::Object(facet_coverage),
            "facets_explored": facets,
            "total_results": results.len(),
        })
    }
}
