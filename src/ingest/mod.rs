//! Document ingestion: parser contract, chunking, and the pipeline driver

pub mod chunker;
pub mod markdown;
pub mod pipeline;

use crate::error::{Result, RetrievalError};
use crate::model::DocumentMetadata;
use std::path::Path;

/// Structural kind of a parsed element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Heading,
    Paragraph,
    Table,
    List,
    Figure,
}

/// A structural fragment extracted from a document
///
/// Produced by a [`DocumentParser`]; immutable thereafter; consumed in
/// order by the chunker. Non-heading elements inherit the hierarchy of
/// the most recent heading.
#[derive(Debug, Clone)]
pub struct ParsedElement {
    pub kind: ElementKind,
    pub text: String,
    pub page_number: Option<u32>,
    pub section_hierarchy: Vec<String>,
    pub heading_level: Option<u8>,
    pub table_data: Option<Vec<Vec<String>>>,
    pub caption: Option<String>,
}

impl ParsedElement {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Paragraph,
            text: text.into(),
            page_number: None,
            section_hierarchy: Vec::new(),
            heading_level: None,
            table_data: None,
            caption: None,
        }
    }

    pub fn heading(text: impl Into<String>, level: u8) -> Self {
        Self {
            kind: ElementKind::Heading,
            text: text.into(),
            page_number: None,
            section_hierarchy: Vec::new(),
            heading_level: Some(level),
            table_data: None,
            caption: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }
}

/// A fully parsed document: metadata plus ordered elements
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub metadata: DocumentMetadata,
    pub elements: Vec<ParsedElement>,
}

/// Contract for format-specific document parsers
///
/// Format-specific extraction for binary formats lives outside this
/// crate; implementations only have to produce the common
/// [`ParsedDocument`] representation.
pub trait DocumentParser: Send + Sync {
    /// Parse a source file into metadata and ordered elements
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// File extensions this parser handles, with leading dot
    fn supported_extensions(&self) -> &[&'static str];

    /// Check whether this parser handles the given path
    fn supports(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()));
        match ext {
            Some(ext) => self.supported_extensions().contains(&ext.as_str()),
            None => false,
        }
    }
}

/// Find the first registered parser that supports a path
pub fn parser_for<'a>(
    parsers: &'a [Box<dyn DocumentParser>],
    path: &Path,
) -> Result<&'a dyn DocumentParser> {
    parsers
        .iter()
        .map(|p| p.as_ref())
        .find(|p| p.supports(path))
        .ok_or_else(|| {
            RetrievalError::InvalidInput(format!(
                "no parser registered for {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::markdown::MarkdownParser;

    #[test]
    fn test_parser_lookup_by_extension() {
        let parsers: Vec<Box<dyn DocumentParser>> = vec![Box::new(MarkdownParser::new())];

        assert!(parser_for(&parsers, Path::new("doc.md")).is_ok());
        assert!(parser_for(&parsers, Path::new("doc.MD")).is_ok());
        assert!(parser_for(&parsers, Path::new("doc.pdf")).is_err());
        assert!(parser_for(&parsers, Path::new("doc")).is_err());
    }

    #[test]
    fn test_unsupported_extension_is_invalid_input() {
        let parsers: Vec<Box<dyn DocumentParser>> = vec![Box::new(MarkdownParser::new())];
        let err = match parser_for(&parsers, Path::new("doc.docx")) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.error_code(), "invalid_input");
    }
}
