//! Workflow search strategies
//!
//! A strategy customizes three phases around the fixed retrieval
//! template: query preprocessing, ranking adjustment, and output
//! shaping. The retrieval core itself stays shared.

pub mod explore;
pub mod plan;
pub mod rcca;
pub mod trade;

use super::models::SearchResult;
use crate::store::Filter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal representation of a preprocessed query
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub original: String,
    pub expanded_terms: Vec<String>,
    pub filters: Option<Filter>,
    pub facets: Vec<String>,
}

/// Strategy-specific request parameters
///
/// A flat bag of optional fields; each strategy reads the ones it
/// understands and ignores the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowParams {
    pub filters: Option<Filter>,
    pub facets: Option<Vec<String>>,
    pub category: Option<String>,
    pub categories: Option<Vec<String>>,
    pub alternatives: Option<Vec<String>>,
    pub criteria: Option<Vec<String>>,
    pub project_id: Option<String>,
}

/// A workflow-specific search strategy
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Stable strategy name, used in logs
    fn name(&self) -> &'static str;

    /// Transform the user query into the internal representation
    ///
    /// Async to leave room for model-based query expansion.
    async fn preprocess_query(&self, query: &str, params: &WorkflowParams) -> SearchQuery;

    /// Re-score and re-sort results
    ///
    /// Scores must stay finite but are not required to stay in [0, 1].
    /// Boosts are multiplicative and clamped at 1.0.
    fn adjust_ranking(&self, results: Vec<SearchResult>) -> Vec<SearchResult>;

    /// Shape the final structured output
    ///
    /// Must include a `result_type` field identifying the workflow.
    fn format_output(&self, results: &[SearchResult], params: &WorkflowParams) -> Value;
}

/// Multiplicative boost clamped at 1.0
pub(crate) fn boost(score: f32, factor: f32) -> f32 {
    (score * factor).min(1.0)
}

/// Count how many of the keywords occur in the text (already lowercased)
pub(crate) fn keyword_matches(content_lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| content_lower.contains(*k)).count()
}

/// Sort results by score, descending
pub(crate) fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
