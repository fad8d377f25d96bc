//! Core data model: chunks, document metadata, and classifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Document classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Standard,
    Handbook,
    Guide,
    Spec,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Handbook => "handbook",
            Self::Guide => "guide",
            Self::Spec => "spec",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content classification of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Table,
    List,
    Figure,
    Definition,
    Requirement,
    Guidance,
    Example,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::List => "list",
            Self::Figure => "figure",
            Self::Definition => "definition",
            Self::Requirement => "requirement",
            Self::Guidance => "guidance",
            Self::Example => "example",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normative/informative classification per RFC 2119 conventions
///
/// Advisory metadata only; classification never filters content away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normativity {
    Normative,
    Informative,
    Unknown,
}

impl Normativity {
    /// Boolean payload representation: normative = true, informative = false,
    /// unknown = null
    pub fn as_payload(&self) -> Value {
        match self {
            Self::Normative => Value::Bool(true),
            Self::Informative => Value::Bool(false),
            Self::Unknown => Value::Null,
        }
    }
}

/// Metadata for a source document
///
/// Immutable for a given ingestion. Chunks reference documents by id;
/// there is no back-pointer from metadata to chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub title: String,
    pub document_type: DocumentType,
    pub source_path: String,
    pub version: Option<String>,
    pub publication_date: Option<String>,
    pub standard_id: Option<String>,
}

impl DocumentMetadata {
    pub fn new(
        document_id: impl Into<String>,
        title: impl Into<String>,
        document_type: DocumentType,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            document_type,
            source_path: source_path.into(),
            version: None,
            publication_date: None,
            standard_id: None,
        }
    }
}

/// A retrieval unit: a span of text with provenance and a dense vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    // Identity
    pub id: Uuid,
    pub document_id: String,
    pub document_title: String,
    pub document_type: DocumentType,
    pub content_hash: String,
    pub token_count: usize,

    // Content
    pub text: String,
    pub chunk_type: ChunkType,

    // Provenance
    pub section_hierarchy: Vec<String>,
    pub section_title: String,
    pub clause_number: Option<String>,
    pub page_numbers: Vec<u32>,
    pub has_overlap: bool,
    pub caption: Option<String>,

    // Classification
    pub normative: Normativity,

    // Vector, populated by the embedding phase
    pub embedding: Vec<f32>,
    pub embedding_model: String,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    /// Flatten the chunk into the payload stored next to its vector
    ///
    /// The payload carries everything needed to rebuild a search result
    /// and its citation without a second lookup.
    pub fn payload(&self) -> Value {
        json!({
            "content": self.text,
            "content_hash": self.content_hash,
            "token_count": self.token_count,
            "document_id": self.document_id,
            "document_title": self.document_title,
            "document_type": self.document_type.as_str(),
            "section_hierarchy": self.section_hierarchy,
            "section_title": self.section_title,
            "clause_number": self.clause_number,
            "page_numbers": self.page_numbers,
            "has_overlap": self.has_overlap,
            "caption": self.caption,
            "chunk_type": self.chunk_type.as_str(),
            "normative": self.normative.as_payload(),
            "embedding_model": self.embedding_model,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        let now = Utc::now();
        Chunk {
            id: Uuid::new_v4(),
            document_id: "ieee-15288-2014".to_string(),
            document_title: "IEEE 15288.2-2014".to_string(),
            document_type: DocumentType::Standard,
            content_hash: "abc".to_string(),
            token_count: 42,
            text: "The SRR shall verify requirements.".to_string(),
            chunk_type: ChunkType::Text,
            section_hierarchy: vec!["5".to_string(), "5.3".to_string()],
            section_title: "5.3 System Requirements Review".to_string(),
            clause_number: Some("5.3".to_string()),
            page_numbers: vec![12],
            has_overlap: false,
            caption: None,
            normative: Normativity::Normative,
            embedding: vec![0.1, 0.2],
            embedding_model: "text-embedding-3-small".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_payload_flattening() {
        let chunk = sample_chunk();
        let payload = chunk.payload();

        assert_eq!(payload["document_type"], "standard");
        assert_eq!(payload["normative"], Value::Bool(true));
        assert_eq!(payload["clause_number"], "5.3");
        assert_eq!(payload["page_numbers"][0], 12);
        // The vector itself never goes into the payload
        assert!(payload.get("embedding").is_none());
    }

    #[test]
    fn test_normativity_payload_tristate() {
        assert_eq!(Normativity::Normative.as_payload(), Value::Bool(true));
        assert_eq!(Normativity::Informative.as_payload(), Value::Bool(false));
        assert_eq!(Normativity::Unknown.as_payload(), Value::Null);
    }

    #[test]
    fn test_enum_serde_names() {
        assert_eq!(
            serde_json::to_value(ChunkType::Definition).unwrap(),
            Value::String("definition".to_string())
        );
        assert_eq!(
            serde_json::to_value(DocumentType::Handbook).unwrap(),
            Value::String("handbook".to_string())
        );
    }
}
