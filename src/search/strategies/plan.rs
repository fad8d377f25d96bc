//! Project planning support strategy

use super::{boost, keyword_matches, sort_by_score, SearchQuery, SearchStrategy, WorkflowParams};
use crate::search::models::SearchResult;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Strategy for planning workflows
///
/// Supports retrieval of templates, risk material, lessons learned, and
/// precedents. With a category the query is expanded with that
/// category's keywords; without one, results are categorized by keyword
/// matching on content.
pub struct PlanStrategy;

const PLANNING_KEYWORDS: &[&str] = &[
    "planning",
    "template",
    "framework",
    "methodology",
    "approach",
    "strategy",
    "roadmap",
    "schedule",
    "timeline",
];

const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "templates",
        &["template", "framework", "methodology", "pattern", "structure"],
    ),
    (
        "risks",
        &["risk", "hazard", "threat", "mitigation", "contingency", "failure"],
    ),
    (
        "lessons_learned",
        &["lesson", "retrospective", "post-mortem", "learned", "experience"],
    ),
    (
        "precedents",
        &["precedent", "case study", "example", "similar", "previous", "past project"],
    ),
];

impl PlanStrategy {
    fn category_keywords(category: &str) -> Option<&'static [&'static str]> {
        CATEGORIES
            .iter()
            .find(|(name, _)| *name == category)
            .map(|(_, keywords)| *keywords)
    }

    /// The requested category: `category` wins, else a single-element
    /// `categories` list is treated the same way
    fn requested_category(params: &WorkflowParams) -> Option<String> {
        if let Some(category) = &params.category {
            return Some(category.clone());
        }
        match params.categories.as_deref() {
            Some([only]) => Some(only.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl SearchStrategy for PlanStrategy {
    fn name(&self) -> &'static str {
        "plan"
    }

    async fn preprocess_query(&self, query: &str, params: &WorkflowParams) -> SearchQuery {
        let mut expanded_terms = Vec::new();
        let mut facets = Vec::new();

        match Self::requested_category(params).as_deref().and_then(|c| {
            Self::category_keywords(c).map(|k| (c.to_string(), k))
        }) {
            Some((category, keywords)) => {
                expanded_terms.extend(keywords.iter().map(|s| s.to_string()));
                facets.push(category);
            }
            None => {
                expanded_terms.extend(PLANNING_KEYWORDS.iter().map(|s| s.to_string()));
                facets.extend(CATEGORIES.iter().map(|(name, _)| name.to_string()));
            }
        }

        SearchQuery {
            original: query.to_string(),
            expanded_terms,
            filters: params.filters.clone(),
            facets,
        }
    }

    fn adjust_ranking(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        for result in &mut results {
            let content_lower = result.content.to_lowercase();

            let matches = keyword_matches(&content_lower, PLANNING_KEYWORDS);
            if matches > 0 {
                // Up to 10% by keyword density
                let factor = 1.0 + (matches as f32 * 0.02).min(0.10);
                result.score = boost(result.score, factor);
            }

            if result.document_type.to_lowercase().contains("template")
                || result.document_type.to_lowercase().contains("framework")
            {
                result.score = boost(result.score, 1.05);
            }
        }
        sort_by_score(&mut results);
        results
    }

    fn format_output(&self, results: &[SearchResult], params: &WorkflowParams) -> Value {
        if let Some(category) = Self::requested_category(params) {
            return json!({
                "result_type": "plan_analysis",
                "category": category,
                "results": results.iter().map(|r| r.to_output()).collect::<Vec<_>>(),
                "count": results.len(),
                "total_results": results.len(),
            });
        }

        let mut categorized: Map<String, Value> = CATEGORIES
            .iter()
            .map(|(name, _)| (name.to_string(), Value::Array(Vec::new())))
            .collect();

        for result in results {
            let content_lower = result.content.to_lowercase();
            let category = CATEGORIES
                .iter()
                .find(|(_, keywords)| keyword_matches(&content_lower, keywords) > 0)
                .map(|(name, _)| *name)
                // Uncategorized content defaults to templates
                .unwrap_or("templates");

            if let Some(Value::Array(bucket)) = categorized.get_mut(category) {
                bucket.push(result.to_output());
            }
        }

        json!({
            "result_type": "plan_analysis",
            "categories": Value::Object(categorized),
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
    async fn test_category_drives_expansion() {
        let strategy = PlanStrategy;
        let params = WorkflowParams {
            category: Some("risks".to_string()),
            ..WorkflowParams::default()
        };
        let query = strategy.preprocess_query("launch readiness", &params).await;

        assert!(query.expanded_terms.contains(&"mitigation".to_string()));
        assert!(!query.expanded_terms.contains(&"roadmap".to_string()));
        assert_eq!(query.facets, vec!["risks"]);
    }

    #[tokio::test]
    async fn test_no_category_uses_planning_keywords_and_all_facets() {
        let strategy = PlanStrategy;
        let query = strategy
            .preprocess_query("project planning", &WorkflowParams::default())
            .await;

        assert!(query.expanded_terms.contains(&"roadmap".to_string()));
        assert_eq!(
            query.facets,
            vec!["templates", "risks", "lessons_learned", "precedents"]
        );
    }

    #[tokio::test]
    async fn test_single_categories_entry_acts_as_category() {
        let strategy = PlanStrategy;
        let params = WorkflowParams {
            categories: Some(vec!["precedents".to_string()]),
            ..WorkflowParams::default()
        };
        let query = strategy.preprocess_query("similar programs", &params).await;
        assert_eq!(query.facets, vec!["precedents"]);
    }

    #[test]
    fn test_planning_keyword_boost() {
        let strategy = PlanStrategy;
        let adjusted = strategy.adjust_ranking(vec![
            result("background reading with no relevant terms", 0.50),
            result("a planning template with schedule and roadmap", 0.50),
        ]);

        assert!(adjusted[0].content.contains("planning template"));
        // Four keyword hits: 8% boost
        assert!((adjusted[0].score - 0.54).abs() < 1e-6);
    }

    #[test]
    fn test_categorized_output() {
        let strategy = PlanStrategy;
        let results = vec![
            result("a schedule template for reviews", 0.9),
            result("risk mitigation strategies for suppliers", 0.8),
            result("lessons learned from the previous build", 0.7),
            result("plain content without category markers", 0.6),
        ];
        let output = strategy.format_output(&results, &WorkflowParams::default());

        assert_eq!(output["result_type"], "plan_analysis");
        let categories = output["categories"].as_object().unwrap();
        assert_eq!(categories["templates"].as_array().unwrap().len(), 2);
        assert_eq!(categories["risks"].as_array().unwrap().len(), 1);
        assert_eq!(categories["lessons_learned"].as_array().unwrap().len(), 1);
        assert_eq!(output["total_results"], 4);
    }

    #[test]
    fn test_flat_output_with_category() {
        let strategy = PlanStrategy;
        let params = WorkflowParams {
            category: Some("risks".to_string()),
            ..WorkflowParams::default()
        };
        let output = strategy.format_output(&[result("risk register", 0.9)], &params);

        assert_eq!(output["category"], "risks");
        assert_eq!(output["results"].as_array().unwrap().len(), 1);
        assert_eq!(output["count"], 1);
    }
}
