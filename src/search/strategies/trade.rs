//! Trade study comparison strategy

use super::{boost, sort_by_score, SearchQuery, SearchStrategy, WorkflowParams};
use crate::search::models::SearchResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

// Numbers with units or percentages read as quantitative evidence
static QUANTITATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d+(?:\.\d+)?\s*(?:%|percent|kg|g|mm|cm|m\b|km|s\b|ms|hz|khz|mhz|db|v\b|w\b|x\b)")
        .expect("valid regex")
});

/// Strategy for comparing alternatives against criteria
///
/// Groups results by the alternative they mention and favors content
/// carrying quantitative evidence (numbers with units, percentages).
pub struct TradeStudyStrategy;

const TRADE_TERMS: &[&str] = &["comparison", "trade study", "evaluation", "criteria", "weighting"];

impl TradeStudyStrategy {
    fn quantitative_matches(content: &str) -> usize {
        QUANTITATIVE.find_iter(content).count()
    }
}

#[async_trait]
impl SearchStrategy for TradeStudyStrategy {
    fn name(&self) -> &'static str {
        "trade"
    }

    async fn preprocess_query(&self, query: &str, params: &WorkflowParams) -> SearchQuery {
        let mut expanded_terms: Vec<String> =
            TRADE_TERMS.iter().map(|s| s.to_string()).collect();
        if let Some(criteria) = &params.criteria {
            expanded_terms.extend(criteria.iter().cloned());
        }

        SearchQuery {
            original: query.to_string(),
            expanded_terms,
            filters: params.filters.clone(),
            facets: params.alternatives.clone().unwrap_or_default(),
        }
    }

    fn adjust_ranking(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        for result in &mut results {
            let matches = Self::quantitative_matches(&result.content);
            if matches > 0 {
                // 2% per quantitative hit, capped at 10%
                let factor = 1.0 + (matches as f32 * 0.02).min(0.10);
                result.score = boost(result.score, factor);
            }
        }
        sort_by_score(&mut results);
        results
    }

    fn format_output(&self, results: &[SearchResult], params: &WorkflowParams) -> Value {
        let alternatives = params.alternatives.clone().unwrap_or_default();

        let mut by_alternative: Map<String, Value> = alternatives
            .iter()
            .map(|a| (a.clone(), Value::Array(Vec::new())))
            .collect();
        let mut general = Vec::new();

        for result in results {
            let content_lower = result.content.to_lowercase();
            let matched = alternatives
                .iter()
                .find(|alt| content_lower.contains(&alt.to_lowercase()));

            match matched {
                Some(alt) => {
                    if let Some(Value::Array(bucket)) = by_alternative.get_mut(alt) {
                        bucket.push(result.to_output());
                    }
                }
                None => general.push(result.to_output()),
            }
        }

        json!({
            "result_type": "trade_analysis",
            "alternatives": alternatives,
            "criteria": params.criteria.clone().unwrap_or_default(),
            "results_by_alternative": Value::Object(by_alternative),
            "general": general,
            "total_results": results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str, score: f32) -> SearchResult {
        SearchResult::from_lexical(content.to_string(), content.to_string(), score)
    }

    fn params_with_alternatives() -> WorkflowParams {
        WorkflowParams {
            alternatives: Some(vec!["PostgreSQL".to_string(), "MongoDB".to_string()]),
            criteria: Some(vec!["throughput".to_string(), "cost".to_string()]),
            ..WorkflowParams::default()
        }
    }

    #[tokio::test]
    async fn test_criteria_expand_the_query() {
        let strategy = TradeStudyStrategy;
        let query = strategy
            .preprocess_query("database selection", &params_with_alternatives())
            .await;

        assert!(query.expanded_terms.contains(&"throughput".to_string()));
        assert!(query.expanded_terms.contains(&"trade study".to_string()));
        assert_eq!(query.facets, vec!["PostgreSQL", "MongoDB"]);
    }

    #[test]
    fn test_quantitative_content_is_boosted() {
        let strategy = TradeStudyStrategy;
        let adjusted = strategy.adjust_ranking(vec![
            result("qualitative narrative about options", 0.50),
            result("throughput of 12000 ops at 35 ms latency, 99.9 % uptime", 0.50),
        ]);

        assert!(adjusted[0].content.contains("throughput"));
        assert!(adjusted[0].score > 0.50);
        assert!((adjusted[1].score - 0.50).abs() < 1e-6);
    }

    #[test]
    fn test_quantitative_detection() {
        assert!(TradeStudyStrategy::quantitative_matches("weighs 3.2 kg") > 0);
        assert!(TradeStudyStrategy::quantitative_matches("achieves 99 %") > 0);
        assert_eq!(TradeStudyStrategy::quantitative_matches("chapter 5 discusses"), 0);
    }

    #[test]
    fn test_results_grouped_by_alternative() {
        let strategy = TradeStudyStrategy;
        let results = vec![
            result("PostgreSQL sustains high write loads", 0.9),
            result("MongoDB shines for document models", 0.8),
            result("general guidance on trade studies", 0.7),
        ];
        let output = strategy.format_output(&results, &params_with_alternatives());

        assert_eq!(output["result_type"], "trade_analysis");
        let by_alt = output["results_by_alternative"].as_object().unwrap();
        assert_eq!(by_alt["PostgreSQL"].as_array().unwrap().len(), 1);
        assert_eq!(by_alt["MongoDB"].as_array().unwrap().len(), 1);
        assert_eq!(output["general"].as_array().unwrap().len(), 1);
        assert_eq!(output["total_results"], 3);
    }

    #[test]
    fn test_no_alternatives_puts_everything_in_general() {
        let strategy = TradeStudyStrategy;
        let results = vec![result("anything at all", 0.5)];
        let output = strategy.format_output(&results, &WorkflowParams::default());
        assert_eq!(output["general"].as_array().unwrap().len(), 1);
    }
}
