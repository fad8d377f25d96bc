//! Root cause corrective action (failure analysis) strategy

use super::{boost, keyword_matches, sort_by_score, SearchQuery, SearchStrategy, WorkflowParams};
use crate::search::models::SearchResult;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Strategy optimized for failure analysis workflows
///
/// Expands queries with failure-mode synonyms and favors content that
/// reads like a symptom, a root cause, or a corrective action. Output
/// groups results along those three axes.
pub struct RccaStrategy;

const FAILURE_SYNONYMS: &[&str] = &[
    "failure",
    "fault",
    "defect",
    "anomaly",
    "malfunction",
    "degradation",
    "nonconformance",
];

const SYMPTOM_KEYWORDS: &[&str] = &[
    "symptom",
    "observed",
    "indication",
    "anomaly",
    "deviation",
    "alarm",
];

const CAUSE_KEYWORDS: &[&str] = &[
    "root cause",
    "cause",
    "mechanism",
    "contributing factor",
    "origin",
    "induced by",
];

const ACTION_KEYWORDS: &[&str] = &[
    "corrective action",
    "mitigation",
    "remedy",
    "resolution",
    "prevent",
    "rework",
];

impl RccaStrategy {
    fn bucket_for(content_lower: &str) -> &'static str {
        if keyword_matches(content_lower, SYMPTOM_KEYWORDS) > 0 {
            "symptoms"
        } else if keyword_matches(content_lower, CAUSE_KEYWORDS) > 0 {
            "root_causes"
        } else if keyword_matches(content_lower, ACTION_KEYWORDS) > 0 {
            "corrective_actions"
        } else {
            "related"
        }
    }
}

#[async_trait]
impl SearchStrategy for RccaStrategy {
    fn name(&self) -> &'static str {
        "rcca"
    }

    async fn preprocess_query(&self, query: &str, params: &WorkflowParams) -> SearchQuery {
        SearchQuery {
            original: query.to_string(),
            expanded_terms: FAILURE_SYNONYMS.iter().map(|s| s.to_string()).collect(),
            filters: params.filters.clone(),
            facets: vec![
                "symptoms".to_string(),
                "root_causes".to_string(),
                "corrective_actions".to_string(),
            ],
        }
    }

    fn adjust_ranking(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        for result in &mut results {
            let content_lower = result.content.to_lowercase();
            let matches = keyword_matches(&content_lower, SYMPTOM_KEYWORDS)
                + keyword_matches(&content_lower, CAUSE_KEYWORDS)
                + keyword_matches(&content_lower, ACTION_KEYWORDS);

            if matches > 0 {
                // Density-capped boost: 2% per keyword up to 10%
                let factor = 1.0 + (matches as f32 * 0.02).min(0.10);
                result.score = boost(result.score, factor);
            }
        }
        sort_by_score(&mut results);
        results
    }

    fn format_output(&self, results: &[SearchResult], params: &WorkflowParams) -> Value {
        let mut symptoms = Vec::new();
        let mut root_causes = Vec::new();
        let mut corrective_actions = Vec::new();
        let mut related = Vec::new();

        for result in results {
            let bucket = Self::bucket_for(&result.content.to_lowercase());
            let entry = result.to_output();
            match bucket {
                "symptoms" => symptoms.push(entry),
                "root_causes" => root_causes.push(entry),
                "corrective_actions" => corrective_actions.push(entry),
                _ => related.push(entry),
            }
        }

        json!({
            "result_type": "rcca_analysis",
            "symptoms": symptoms,
            "root_causes": root_causes,
            "corrective_actions": corrective_actions,
            "related": related,
            "project_id": params.project_id,
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

    #[tokio::test]
    async fn test_query_expansion_with_failure_synonyms() {
        let strategy = RccaStrategy;
        let query = strategy
            .preprocess_query("power supply failure", &WorkflowParams::default())
            .await;

        assert_eq!(query.original, "power supply failure");
        assert!(query.expanded_terms.contains(&"fault".to_string()));
        assert!(query.expanded_terms.contains(&"nonconformance".to_string()));
    }

    #[test]
    fn test_keyword_boost_is_density_capped() {
        let strategy = RccaStrategy;
        let adjusted = strategy.adjust_ranking(vec![
            result("plain background text about design", 0.50),
            result("the observed symptom points to a root cause", 0.50),
        ]);

        // Four matches (observed, symptom, root cause, cause): 8% boost
        assert_eq!(adjusted[0].content, "the observed symptom points to a root cause");
        assert!((adjusted[0].score - 0.54).abs() < 1e-6);
        assert!((adjusted[1].score - 0.50).abs() < 1e-6);
    }

    #[test]
    fn test_boost_clamped_at_one() {
        let strategy = RccaStrategy;
        let adjusted = strategy.adjust_ranking(vec![result("corrective action plan", 0.99)]);
        assert!(adjusted[0].score <= 1.0);
    }

    #[test]
    fn test_output_grouping() {
        let strategy = RccaStrategy;
        let results = vec![
            result("the observed deviation in output voltage", 0.9),
            result("root cause was solder joint fatigue", 0.8),
            result("corrective action: rework and re-inspect", 0.7),
            result("reference material on power design", 0.6),
        ];
        let output = strategy.format_output(&results, &WorkflowParams::default());

        assert_eq!(output["result_type"], "rcca_analysis");
        assert_eq!(output["symptoms"].as_array().unwrap().len(), 1);
        assert_eq!(output["root_causes"].as_array().unwrap().len(), 1);
        assert_eq!(output["corrective_actions"].as_array().unwrap().len(), 1);
        assert_eq!(output["related"].as_array().unwrap().len(), 1);
        assert_eq!(output["total_results"], 4);
    }

    #[test]
    fn test_symptom_precedence_over_cause() {
        // Content matching both bins where the first match wins
        assert_eq!(
            RccaStrategy::bucket_for("the observed symptom and its cause"),
            "symptoms"
        );
    }
}
