//! Search result model with flattened citation fields

use super::citation::format_citation;
use crate::store::ScoredPoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single search result with content, score, and citation metadata
///
/// Citation fields are flattened out of the store payload so callers
/// never dig through nested metadata to build a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f32,

    /// Full payload from the vector store, kept for extensibility
    pub metadata: Value,

    pub document_id: String,
    pub document_title: String,
    pub document_type: String,
    pub section_title: String,
    pub section_hierarchy: Vec<String>,
    pub chunk_type: String,
    pub normative: bool,
    pub clause_number: Option<String>,
    pub page_numbers: Vec<u32>,
}

impl SearchResult {
    /// Build a result from a raw store hit, flattening citation fields
    pub fn from_point(point: ScoredPoint) -> Self {
        let payload = &point.payload;

        let section_hierarchy = payload
            .get("section_hierarchy")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let page_numbers = payload
            .get("page_numbers")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_u64().map(|n| n as u32))
                    .collect()
            })
            .unwrap_or_default();

        let str_field = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            id: point.id,
            content: point.content,
            score: point.score,
            document_id: str_field("document_id"),
            document_title: str_field("document_title"),
            document_type: str_field("document_type"),
            section_title: str_field("section_title"),
            section_hierarchy,
            chunk_type: str_field("chunk_type"),
            normative: payload
                .get("normative")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            clause_number: payload
                .get("clause_number")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            page_numbers,
            metadata: point.payload,
        }
    }

    /// A result known only from the lexical index, with no payload
    pub fn from_lexical(id: String, content: String, score: f32) -> Self {
        Self {
            id,
            content,
            score,
            metadata: Value::Null,
            document_id: String::new(),
            document_title: String::new(),
            document_type: String::new(),
            section_title: String::new(),
            section_hierarchy: Vec::new(),
            chunk_type: String::new(),
            normative: false,
            clause_number: None,
            page_numbers: Vec::new(),
        }
    }

    /// Standards-style citation for this result
    pub fn citation(&self) -> String {
        format_citation(
            &self.document_title,
            self.clause_number.as_deref(),
            if self.page_numbers.is_empty() {
                None
            } else {
                Some(&self.page_numbers)
            },
            if self.section_title.is_empty() {
                None
            } else {
                Some(&self.section_title)
            },
        )
    }

    /// Citation with a relevance percentage appended
    pub fn citation_with_relevance(&self) -> String {
        let relevance_pct = (self.score.clamp(0.0, 1.0) * 100.0) as u32;
        format!("{} ({relevance_pct}% relevant)", self.citation())
    }

    /// Serialize for strategy output, citation included
    pub fn to_output(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "content": self.content,
            "score": self.score,
            "document_id": self.document_id,
            "document_title": self.document_title,
            "document_type": self.document_type,
            "section_title": self.section_title,
            "section_hierarchy": self.section_hierarchy,
            "chunk_type": self.chunk_type,
            "normative": self.normative,
            "clause_number": self.clause_number,
            "page_numbers": self.page_numbers,
            "citation": self.citation(),
        })
    }
}
