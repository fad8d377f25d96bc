//! Hierarchical chunking of parsed elements into retrieval units

use super::{ElementKind, ParsedElement};
use crate::config::ChunkingConfig;
use crate::error::{Result, RetrievalError};
use crate::model::{Chunk, ChunkType, DocumentMetadata};
use crate::util::normative::detect_normativity;
use crate::util::tokenizer::{count_tokens, tail_tokens};
use crate::util::hashing::content_hash;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

static CLAUSE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\b").expect("valid regex"));

const ELEMENT_SEPARATOR: &str = "\n\n";

/// A chunk under construction, before hashing and id assignment
struct Draft {
    text: String,
    token_count: usize,
    section_hierarchy: Vec<String>,
    section_title: String,
    pages: Vec<u32>,
    chunk_type: ChunkType,
    has_overlap: bool,
    caption: Option<String>,
    oversize_single: bool,
}

/// Chunker that walks parsed elements in document order, respecting
/// heading hierarchy and token bounds
pub struct HierarchicalChunker {
    config: ChunkingConfig,
    model: String,
    sep_tokens: usize,
}

impl HierarchicalChunker {
    pub fn new(config: ChunkingConfig, model: impl Into<String>) -> Self {
        let model = model.into();
        let sep_tokens = count_tokens(ELEMENT_SEPARATOR, &model);
        Self {
            config,
            model,
            sep_tokens,
        }
    }

    /// Hard per-chunk token limit
    pub fn max_tokens(&self) -> usize {
        self.config.max_tokens
    }

    /// Chunk ordered document elements into retrieval units
    ///
    /// Fails with `invalid_input` on an empty element list. A single
    /// element that exceeds `max_tokens` passes through unsplit with a
    /// warning; content is never silently dropped.
    pub fn chunk(
        &self,
        elements: &[ParsedElement],
        metadata: &DocumentMetadata,
    ) -> Result<Vec<Chunk>> {
        if elements.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "cannot chunk an empty element list".to_string(),
            ));
        }

        let mut state = WalkState::new(&self.config, &self.model, self.sep_tokens);

        for element in elements {
            match element.kind {
                ElementKind::Heading => state.on_heading(element),
                ElementKind::Table => state.on_table_or_figure(element, ChunkType::Table),
                ElementKind::Figure => state.on_table_or_figure(element, ChunkType::Figure),
                ElementKind::List => state.on_list(element),
                ElementKind::Paragraph => state.on_paragraph(element),
            }
        }
        state.flush();

        let mut drafts = state.drafts;
        if self.config.merge_small_chunks {
            merge_small_drafts(
                &mut drafts,
                self.config.merge_threshold_tokens,
                self.config.max_tokens,
                &self.model,
            );
        }

        debug!(
            document_id = %metadata.document_id,
            chunks = drafts.len(),
            "chunked document"
        );

        Ok(drafts
            .into_iter()
            .map(|d| self.finalize(d, metadata))
            .collect())
    }

    fn finalize(&self, draft: Draft, metadata: &DocumentMetadata) -> Chunk {
        let clause_number = CLAUSE_PREFIX
            .captures(&draft.section_title)
            .map(|caps| caps[1].to_string());

        let normative = detect_normativity(&draft.text, &draft.section_title);

        let mut pages = draft.pages;
        pages.sort_unstable();
        pages.dedup();

        let now = Utc::now();
        Chunk {
            id: Uuid::new_v4(),
            document_id: metadata.document_id.clone(),
            document_title: metadata.title.clone(),
            document_type: metadata.document_type,
            content_hash: content_hash(&draft.text),
            token_count: draft.token_count,
            text: draft.text,
            chunk_type: draft.chunk_type,
            section_hierarchy: draft.section_hierarchy,
            section_title: draft.section_title,
            clause_number,
            page_numbers: pages,
            has_overlap: draft.has_overlap,
            caption: draft.caption,
            normative,
            embedding: Vec::new(),
            embedding_model: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mutable walk state: the running buffer plus section tracking
struct WalkState<'a> {
    config: &'a ChunkingConfig,
    model: &'a str,
    sep_tokens: usize,

    drafts: Vec<Draft>,

    buffer: Vec<String>,
    buffer_tokens: usize,
    buffer_pages: Vec<u32>,
    buffer_has_overlap: bool,

    current_hierarchy: Vec<String>,
    current_title: String,

    // Heading text awaiting the next content chunk
    pending_heading: Option<String>,
    // Trailing tokens of the last emitted chunk, valid only within
    // the section it was emitted in
    pending_overlap: Option<(String, Vec<String>)>,
}

impl<'a> WalkState<'a> {
    fn new(config: &'a ChunkingConfig, model: &'a str, sep_tokens: usize) -> Self {
        Self {
            config,
            model,
            sep_tokens,
            drafts: Vec::new(),
            buffer: Vec::new(),
            buffer_tokens: 0,
            buffer_pages: Vec::new(),
            buffer_has_overlap: false,
            current_hierarchy: Vec::new(),
            current_title: String::new(),
            pending_heading: None,
            pending_overlap: None,
        }
    }

    fn on_heading(&mut self, element: &ParsedElement) {
        self.flush();
        // Overlap is never added across a section boundary
        self.pending_overlap = None;

        if !element.section_hierarchy.is_empty() {
            self.current_hierarchy = element.section_hierarchy.clone();
        }
        self.current_title = element.text.clone();
        self.pending_heading = Some(element.text.clone());
    }

    fn on_table_or_figure(&mut self, element: &ParsedElement, chunk_type: ChunkType) {
        self.flush();
        // Tables and figures neither receive nor produce overlap
        self.pending_overlap = None;

        let token_count = count_tokens(&element.text, self.model);
        if token_count > self.config.max_tokens {
            warn!(
                tokens = token_count,
                max = self.config.max_tokens,
                kind = ?element.kind,
                "element exceeds max_tokens, emitting unsplit"
            );
        }

        self.drafts.push(Draft {
            text: element.text.clone(),
            token_count,
            section_hierarchy: self.current_hierarchy.clone(),
            section_title: self.current_title.clone(),
            pages: element.page_number.into_iter().collect(),
            chunk_type,
            has_overlap: false,
            caption: element.caption.clone(),
            oversize_single: token_count > self.config.max_tokens,
        });
    }

    fn on_list(&mut self, element: &ParsedElement) {
        let list_tokens = count_tokens(&element.text, self.model);
        let sep = if self.buffer.is_empty() { 0 } else { self.sep_tokens };

        // A list that fits joins the running buffer like any other element
        if self.buffer_tokens + sep + list_tokens <= self.config.max_tokens {
            self.push_to_buffer(&element.text, list_tokens, element.page_number);
            if self.buffer_tokens >= self.config.target_tokens {
                self.flush();
            }
            return;
        }

        // Otherwise split at item boundaries only
        self.flush();
        let mut group: Vec<&str> = Vec::new();
        let mut group_tokens = 0usize;

        for item in element.text.lines() {
            let item_tokens = count_tokens(item, self.model);
            if item_tokens > self.config.max_tokens {
                self.emit_list_group(&mut group, &mut group_tokens, element.page_number);
                warn!(
                    tokens = item_tokens,
                    max = self.config.max_tokens,
                    "list item exceeds max_tokens, emitting unsplit"
                );
                self.drafts.push(Draft {
                    text: item.to_string(),
                    token_count: item_tokens,
                    section_hierarchy: self.current_hierarchy.clone(),
                    section_title: self.current_title.clone(),
                    pages: element.page_number.into_iter().collect(),
                    chunk_type: ChunkType::List,
                    has_overlap: false,
                    caption: None,
                    oversize_single: true,
                });
                // The oversize item is now the latest emitted chunk; its
                // tail becomes the overlap source for the next one
                if self.config.overlap_tokens > 0 {
                    self.pending_overlap = Some((
                        tail_tokens(item, self.config.overlap_tokens, self.model),
                        self.current_hierarchy.clone(),
                    ));
                }
                continue;
            }

            let sep = if group.is_empty() { 0 } else { 1 };
            if group_tokens + sep + item_tokens > self.config.max_tokens {
                self.emit_list_group(&mut group, &mut group_tokens, element.page_number);
            }
            group_tokens += item_tokens + if group.is_empty() { 0 } else { 1 };
            group.push(item);
        }
        self.emit_list_group(&mut group, &mut group_tokens, element.page_number);
    }

    fn emit_list_group(
        &mut self,
        group: &mut Vec<&str>,
        group_tokens: &mut usize,
        page: Option<u32>,
    ) {
        if group.is_empty() {
            return;
        }
        let mut text = group.join("\n");
        let mut has_overlap = false;

        // Split list chunks take part in the same overlap chain as
        // paragraph buffers: inherit the predecessor's tail, skipped
        // when it would push the chunk past the hard limit
        if self.config.overlap_tokens > 0 {
            if let Some((overlap, section)) = self.pending_overlap.take() {
                let overlap_tokens = count_tokens(&overlap, self.model);
                if section == self.current_hierarchy
                    && !overlap.is_empty()
                    && overlap_tokens + 1 + *group_tokens <= self.config.max_tokens
                {
                    text = format!("{overlap}\n{text}");
                    has_overlap = true;
                }
            }
        }

        let token_count = count_tokens(&text, self.model);

        if self.config.overlap_tokens > 0 {
            let tail = tail_tokens(&text, self.config.overlap_tokens, self.model);
            self.pending_overlap = Some((tail, self.current_hierarchy.clone()));
        }

        self.drafts.push(Draft {
            text,
            token_count,
            section_hierarchy: self.current_hierarchy.clone(),
            section_title: self.current_title.clone(),
            pages: page.into_iter().collect(),
            chunk_type: ChunkType::List,
            has_overlap,
            caption: None,
            oversize_single: false,
        });
        group.clear();
        *group_tokens = 0;
    }

    fn on_paragraph(&mut self, element: &ParsedElement) {
        let el_tokens = count_tokens(&element.text, self.model);

        if el_tokens > self.config.max_tokens {
            // Single element over the hard limit: pass through unsplit
            self.flush();
            warn!(
                tokens = el_tokens,
                max = self.config.max_tokens,
                "paragraph exceeds max_tokens, emitting unsplit"
            );
            self.drafts.push(Draft {
                text: element.text.clone(),
                token_count: el_tokens,
                section_hierarchy: self.current_hierarchy.clone(),
                section_title: self.current_title.clone(),
                pages: element.page_number.into_iter().collect(),
                chunk_type: ChunkType::Text,
                has_overlap: false,
                caption: None,
                oversize_single: true,
            });
            self.pending_overlap = None;
            return;
        }

        let sep = if self.buffer.is_empty() { 0 } else { self.sep_tokens };
        if self.buffer_tokens + sep + el_tokens > self.config.max_tokens {
            self.flush();
        }

        self.push_to_buffer(&element.text, el_tokens, element.page_number);

        if self.buffer_tokens >= self.config.target_tokens {
            self.flush();
        }
    }

    fn push_to_buffer(&mut self, text: &str, tokens: usize, page: Option<u32>) {
        if self.buffer.is_empty() {
            // Overlap from the previous same-section chunk comes first.
            // Skipped when it would push the chunk past the hard limit.
            if self.config.overlap_tokens > 0 {
                if let Some((overlap, section)) = self.pending_overlap.take() {
                    let overlap_tokens = count_tokens(&overlap, self.model);
                    if section == self.current_hierarchy
                        && !overlap.is_empty()
                        && overlap_tokens + self.sep_tokens + tokens <= self.config.max_tokens
                    {
                        self.buffer_tokens += overlap_tokens;
                        self.buffer.push(overlap);
                        self.buffer_has_overlap = true;
                    }
                }
            }
            // The section heading attaches to its first content chunk
            if let Some(heading) = self.pending_heading.take() {
                let heading_tokens = count_tokens(&heading, self.model);
                let sep = if self.buffer.is_empty() { 0 } else { self.sep_tokens };
                self.buffer_tokens += heading_tokens + sep;
                self.buffer.push(heading);
            }
        }

        let sep = if self.buffer.is_empty() { 0 } else { self.sep_tokens };
        self.buffer_tokens += tokens + sep;
        self.buffer.push(text.to_string());
        if let Some(p) = page {
            self.buffer_pages.push(p);
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let text = self.buffer.join(ELEMENT_SEPARATOR);
        let token_count = count_tokens(&text, self.model);

        if self.config.overlap_tokens > 0 {
            let overlap = tail_tokens(&text, self.config.overlap_tokens, self.model);
            self.pending_overlap = Some((overlap, self.current_hierarchy.clone()));
        }

        self.drafts.push(Draft {
            text,
            token_count,
            section_hierarchy: self.current_hierarchy.clone(),
            section_title: self.current_title.clone(),
            pages: std::mem::take(&mut self.buffer_pages),
            chunk_type: ChunkType::Text,
            has_overlap: self.buffer_has_overlap,
            caption: None,
            oversize_single: false,
        });

        self.buffer.clear();
        self.buffer_tokens = 0;
        self.buffer_has_overlap = false;
    }
}

/// Merge chunks under the threshold with their nearest same-section peer,
/// preferring forward. Never merges across sections, never merges tables
/// or figures, and never produces a chunk over `max_tokens`.
fn merge_small_drafts(drafts: &mut Vec<Draft>, threshold: usize, max_tokens: usize, model: &str) {
    fn mergeable(d: &Draft) -> bool {
        matches!(d.chunk_type, ChunkType::Text | ChunkType::List) && !d.oversize_single
    }

    let mut i = 0;
    while i < drafts.len() {
        if drafts[i].token_count >= threshold || !mergeable(&drafts[i]) {
            i += 1;
            continue;
        }

        let forward_ok = i + 1 < drafts.len()
            && mergeable(&drafts[i + 1])
            && drafts[i + 1].section_hierarchy == drafts[i].section_hierarchy
            && drafts[i].token_count + drafts[i + 1].token_count < max_tokens;

        if forward_ok {
            let small = drafts.remove(i);
            let next = &mut drafts[i];
            next.text = format!("{}{}{}", small.text, ELEMENT_SEPARATOR, next.text);
            next.token_count = count_tokens(&next.text, model);
            next.pages.extend(small.pages);
            next.has_overlap = small.has_overlap;
            continue;
        }

        let backward_ok = i > 0
            && mergeable(&drafts[i - 1])
            && drafts[i - 1].section_hierarchy == drafts[i].section_hierarchy
            && drafts[i].token_count + drafts[i - 1].token_count < max_tokens;

        if backward_ok {
            let small = drafts.remove(i);
            let prev = &mut drafts[i - 1];
            prev.text = format!("{}{}{}", prev.text, ELEMENT_SEPARATOR, small.text);
            prev.token_count = count_tokens(&prev.text, model);
            prev.pages.extend(small.pages);
            continue;
        }

        i += 1;
    }
}
