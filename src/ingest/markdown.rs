//! Markdown and plain-text document parser
//!
//! The in-tree parser for `.md` and `.txt` sources. Binary formats are
//! parsed by external collaborators implementing [`DocumentParser`].

use super::{DocumentParser, ElementKind, ParsedDocument, ParsedElement};
use crate::error::{Result, RetrievalError};
use crate::model::{DocumentMetadata, DocumentType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static CLAUSE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\b").expect("valid regex"));

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+").expect("valid regex"));

static FIGURE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)]*)\)\s*$").expect("valid regex"));

/// Markdown/plain-text parser with section-number tracking
pub struct MarkdownParser {
    document_type: DocumentType,
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self {
            document_type: DocumentType::Guide,
        }
    }

    pub fn with_document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = document_type;
        self
    }

    /// Parse markdown text into ordered elements
    ///
    /// Section hierarchy is taken from explicit clause numbers in
    /// headings ("5.3 Verification") when present, otherwise synthesized
    /// from per-level counters.
    pub fn parse_text(&self, text: &str, metadata: DocumentMetadata) -> ParsedDocument {
        let mut elements = Vec::new();
        // Dotted section labels indexed by heading depth - 1
        let mut section_labels: Vec<String> = Vec::new();
        let mut counters: Vec<u32> = Vec::new();
        let mut pending_caption: Option<String> = None;

        let mut lines = text.lines().peekable();
        let mut paragraph: Vec<&str> = Vec::new();

        macro_rules! flush_paragraph {
            () => {
                if !paragraph.is_empty() {
                    let body = paragraph.join("\n");
                    if !body.trim().is_empty() {
                        elements.push(ParsedElement {
                            kind: ElementKind::Paragraph,
                            text: body.trim().to_string(),
                            page_number: None,
                            section_hierarchy: section_labels.clone(),
                            heading_level: None,
                            table_data: None,
                            caption: None,
                        });
                    }
                    paragraph.clear();
                }
            };
        }

        while let Some(line) = lines.next() {
            let trimmed = line.trim_end();

            // Fenced code blocks pass through verbatim as one paragraph
            if trimmed.starts_with("```") {
                flush_paragraph!();
                let mut block = vec![trimmed.to_string()];
                for inner in lines.by_ref() {
                    block.push(inner.to_string());
                    if inner.trim_start().starts_with("```") {
                        break;
                    }
                }
                elements.push(ParsedElement {
                    kind: ElementKind::Paragraph,
                    text: block.join("\n"),
                    page_number: None,
                    section_hierarchy: section_labels.clone(),
                    heading_level: None,
                    table_data: None,
                    caption: None,
                });
                continue;
            }

            if let Some(rest) = heading_text(trimmed) {
                flush_paragraph!();
                let level = heading_level(trimmed);
                advance_section(&mut section_labels, &mut counters, rest, level);
                elements.push(ParsedElement {
                    kind: ElementKind::Heading,
                    text: rest.to_string(),
                    page_number: None,
                    section_hierarchy: section_labels.clone(),
                    heading_level: Some(level),
                    table_data: None,
                    caption: None,
                });
                continue;
            }

            if let Some(caps) = FIGURE_LINE.captures(trimmed) {
                flush_paragraph!();
                let alt = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                elements.push(ParsedElement {
                    kind: ElementKind::Figure,
                    text: if alt.is_empty() { trimmed.to_string() } else { alt.clone() },
                    page_number: None,
                    section_hierarchy: section_labels.clone(),
                    heading_level: None,
                    table_data: None,
                    caption: if alt.is_empty() { None } else { Some(alt) },
                });
                continue;
            }

            if trimmed.starts_with('|') {
                flush_paragraph!();
                let mut rows = vec![trimmed.to_string()];
                while let Some(next) = lines.peek() {
                    if next.trim_start().starts_with('|') {
                        rows.push(lines.next().unwrap_or_default().to_string());
                    } else {
                        break;
                    }
                }
                let table_data = parse_table_rows(&rows);
                elements.push(ParsedElement {
                    kind: ElementKind::Table,
                    text: rows.join("\n"),
                    page_number: None,
                    section_hierarchy: section_labels.clone(),
                    heading_level: None,
                    table_data: Some(table_data),
                    caption: pending_caption.take(),
                });
                continue;
            }

            if LIST_ITEM.is_match(trimmed) {
                flush_paragraph!();
                let mut items = vec![trimmed.to_string()];
                while let Some(next) = lines.peek() {
                    if LIST_ITEM.is_match(next) {
                        items.push(lines.next().unwrap_or_default().trim_end().to_string());
                    } else {
                        break;
                    }
                }
                elements.push(ParsedElement {
                    kind: ElementKind::List,
                    text: items.join("\n"),
                    page_number: None,
                    section_hierarchy: section_labels.clone(),
                    heading_level: None,
                    table_data: None,
                    caption: None,
                });
                continue;
            }

            if trimmed.trim().is_empty() {
                flush_paragraph!();
                continue;
            }

            // A "Table N: ..." line right before a table becomes its caption
            if trimmed.to_lowercase().starts_with("table ")
                && lines.peek().map(|l| l.trim_start().starts_with('|')).unwrap_or(false)
            {
                flush_paragraph!();
                pending_caption = Some(trimmed.trim().to_string());
                continue;
            }

            paragraph.push(trimmed);
        }
        flush_paragraph!();

        ParsedDocument { metadata, elements }
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for MarkdownParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Ingestion(format!("failed to read {}: {e}", path.display()))
        })?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let document_id = slugify(stem);

        // First level-1 heading wins as the title
        let title = text
            .lines()
            .find_map(|l| l.strip_prefix("# ").map(|t| t.trim().to_string()))
            .unwrap_or_else(|| stem.to_string());

        let metadata = DocumentMetadata::new(
            document_id,
            title,
            self.document_type,
            path.display().to_string(),
        );

        Ok(self.parse_text(&text, metadata))
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &[".md", ".markdown", ".txt"]
    }
}

fn heading_level(line: &str) -> u8 {
    line.chars().take_while(|c| *c == '#').count().min(6) as u8
}

fn heading_text(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    rest.strip_prefix(' ').map(|r| r.trim())
}

/// Update the dotted section labels for a heading at the given level
fn advance_section(labels: &mut Vec<String>, counters: &mut Vec<u32>, heading: &str, level: u8) {
    let depth = level as usize;
    counters.resize(depth.max(counters.len()), 0);
    counters.truncate(depth);
    labels.truncate(depth.saturating_sub(1));

    if let Some(caps) = CLAUSE_PREFIX.captures(heading) {
        // Explicit clause number replaces the synthesized path at this depth
        let clause = caps[1].to_string();
        if let Some(last) = clause.rsplit('.').next() {
            if let Ok(n) = last.parse::<u32>() {
                if let Some(slot) = counters.last_mut() {
                    *slot = n;
                }
            }
        }
        labels.push(clause);
        return;
    }

    if let Some(slot) = counters.last_mut() {
        *slot += 1;
    } else {
        counters.push(1);
    }

    let label = match labels.last() {
        Some(parent) => format!("{parent}.{}", counters[depth - 1]),
        None => counters[depth - 1].to_string(),
    };
    labels.push(label);
}

fn parse_table_rows(rows: &[String]) -> Vec<Vec<String>> {
    rows.iter()
        .filter(|r| {
            // Skip markdown separator rows like |---|---|
            !r.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
        })
        .map(|r| {
            r.trim()
                .trim_matches('|')
                .split('|')
                .map(|c| c.trim().to_string())
                .collect()
        })
        .collect()
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
