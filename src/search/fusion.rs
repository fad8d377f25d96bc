//! Reciprocal rank fusion of dense and lexical result lists

use super::bm25::LexicalHit;
use super::models::SearchResult;
use std::collections::HashMap;

/// RRF constant; score contribution of rank r is 1 / (K + r)
pub const RRF_K: f32 = 60.0;

/// Fuse a dense result list with a lexical one by reciprocal rank
///
/// `score = Σ 1/(K + rank_i)` over the lists an id appears in, ranks
/// starting at 1. Ids known only to the lexical index keep their text
/// but carry no payload. The fused list is sorted descending and cut
/// to `limit`.
pub fn reciprocal_rank_fusion(
    dense: Vec<SearchResult>,
    lexical: Vec<LexicalHit>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut fused_scores: HashMap<String, f32> = HashMap::new();

    for (rank, result) in dense.iter().enumerate() {
        *fused_scores.entry(result.id.clone()).or_insert(0.0) +=
            1.0 / (RRF_K + (rank + 1) as f32);
    }
    for (rank, hit) in lexical.iter().enumerate() {
        *fused_scores.entry(hit.id.clone()).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f32);
    }

    // Dense results keep their payloads; lexical-only ids get a bare result
    let mut by_id: HashMap<String, SearchResult> = HashMap::new();
    for result in dense {
        by_id.insert(result.id.clone(), result);
    }
    for hit in lexical {
        by_id
            .entry(hit.id.clone())
            .or_insert_with(|| SearchResult::from_lexical(hit.id, hit.content, hit.score));
    }

    let mut fused: Vec<SearchResult> = by_id
        .into_values()
        .map(|mut result| {
            result.score = fused_scores.get(&result.id).copied().unwrap_or(0.0);
            result
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused
}
