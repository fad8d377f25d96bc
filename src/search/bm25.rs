//! In-memory BM25 lexical index
//!
//! Keyword retrieval parallel to the vector store, rebuilt on demand
//! from the store's current chunk set. Okapi BM25 scoring over an
//! inverted index; tokenization is lowercase + whitespace split.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

const DEFAULT_K1: f32 = 1.2;
const DEFAULT_B: f32 = 0.75;

/// A document to index: chunk id plus its text
#[derive(Debug, Clone)]
pub struct LexicalDoc {
    pub id: String,
    pub content: String,
}

/// A lexical hit
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// Okapi BM25 inverted index
struct Bm25Index {
    k1: f32,
    b: f32,
    doc_ids: Vec<String>,
    doc_contents: Vec<String>,
    doc_lengths: Vec<usize>,
    avgdl: f32,
    // term -> (doc index, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
}

impl Bm25Index {
    fn empty(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            doc_ids: Vec::new(),
            doc_contents: Vec::new(),
            doc_lengths: Vec::new(),
            avgdl: 0.0,
            postings: HashMap::new(),
        }
    }

    fn build(docs: &[LexicalDoc], k1: f32, b: f32) -> Self {
        let mut index = Self::empty(k1, b);

        for doc in docs {
            let doc_idx = index.doc_ids.len();
            let tokens = tokenize(&doc.content);
            let mut frequencies: HashMap<&str, u32> = HashMap::new();
            for token in &tokens {
                *frequencies.entry(token.as_str()).or_insert(0) += 1;
            }

            for (term, tf) in frequencies {
                index
                    .postings
                    .entry(term.to_string())
                    .or_default()
                    .push((doc_idx, tf));
            }

            index.doc_lengths.push(tokens.len());
            index.doc_ids.push(doc.id.clone());
            index.doc_contents.push(doc.content.clone());
        }

        let total: usize = index.doc_lengths.iter().sum();
        index.avgdl = if index.doc_lengths.is_empty() {
            0.0
        } else {
            total as f32 / index.doc_lengths.len() as f32
        };

        index
    }

    fn search(&self, query: &str, n_results: usize) -> Vec<(usize, f32)> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.doc_ids.is_empty() {
            return Vec::new();
        }

        let n = self.doc_ids.len() as f32;
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for term in &query_tokens {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for &(doc_idx, tf) in postings {
                let tf = tf as f32;
                let dl = self.doc_lengths[doc_idx] as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * dl / self.avgdl.max(1.0));
                let term_score = idf * (tf * (self.k1 + 1.0)) / (tf + norm);
                *scores.entry(doc_idx).or_insert(0.0) += term_score;
            }
        }

        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n_results);
        ranked
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Lexical searcher wrapping the index behind a writer latch
///
/// Rebuilds replace the index atomically: readers observe either the
/// old or the new index, never a partial one.
pub struct Bm25Searcher {
    index: RwLock<Option<Bm25Index>>,
    k1: f32,
    b: f32,
}

impl Bm25Searcher {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(None),
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }

    pub fn with_params(k1: f32, b: f32) -> Self {
        Self {
            index: RwLock::new(None),
            k1,
            b,
        }
    }

    /// Build (or rebuild) the index from a document corpus
    pub async fn build(&self, docs: &[LexicalDoc]) {
        let new_index = Bm25Index::build(docs, self.k1, self.b);
        let mut slot = self.index.write().await;
        *slot = Some(new_index);
        info!(documents = docs.len(), "BM25 index built");
    }

    /// Search for documents matching the query keywords
    ///
    /// Empty query or unbuilt index returns an empty list, not an error.
    pub async fn search(&self, query: &str, n_results: usize) -> Vec<LexicalHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let slot = self.index.read().await;
        let Some(index) = slot.as_ref() else {
            warn!("BM25 search called before index built, returning empty results");
            return Vec::new();
        };

        index
            .search(query, n_results)
            .into_iter()
            .map(|(doc_idx, score)| LexicalHit {
                id: index.doc_ids[doc_idx].clone(),
                content: index.doc_contents[doc_idx].clone(),
                score,
            })
            .collect()
    }

    /// Whether the index has been built
    pub async fn is_indexed(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Number of indexed documents
    pub async fn document_count(&self) -> usize {
        self.index
            .read()
            .await
            .as_ref()
            .map(|i| i.doc_ids.len())
            .unwrap_or(0)
    }
}

impl Default for Bm25Searcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<LexicalDoc> {
        vec![
            LexicalDoc {
                id: "1".to_string(),
                content: "The SRR shall verify system requirements".to_string(),
            },
            LexicalDoc {
                id: "2".to_string(),
                content: "Verification methods include inspection and test".to_string(),
            },
            LexicalDoc {
                id: "3".to_string(),
                content: "Configuration management of design baselines".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_search_finds_keyword_matches() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;

        let hits = searcher.search("system requirements", 10).await;
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn test_scores_descend() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;

        let hits = searcher.search("verification requirements test", 10).await;
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;

        assert!(searcher.search("", 10).await.is_empty());
        assert!(searcher.search("   ", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_unbuilt_index_returns_empty() {
        let searcher = Bm25Searcher::new();
        assert!(!searcher.is_indexed().await);
        assert!(searcher.search("anything", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_match_returns_empty() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;
        assert!(searcher.search("zzzzz qqqqq", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_tokenization_is_case_insensitive() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;

        let upper = searcher.search("VERIFICATION", 10).await;
        let lower = searcher.search("verification", 10).await;
        assert_eq!(upper.len(), lower.len());
        assert!(!upper.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_index() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;
        assert_eq!(searcher.document_count().await, 3);

        searcher
            .build(&[LexicalDoc {
                id: "only".to_string(),
                content: "fresh corpus".to_string(),
            }])
            .await;
        assert_eq!(searcher.document_count().await, 1);
        assert!(searcher.search("requirements", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let searcher = Bm25Searcher::new();
        searcher.build(&corpus()).await;

        let hits = searcher.search("the and of system verification", 1).await;
        assert!(hits.len() <= 1);
    }
}
