//! Token counting backed by the remote provider's billing tokenizer

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tiktoken_rs::CoreBPE;

/// Encodings are looked up once per model identifier and shared read-only
static ENCODINGS: Lazy<RwLock<HashMap<String, Arc<CoreBPE>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn encoding_for(model: &str) -> Arc<CoreBPE> {
    if let Some(bpe) = ENCODINGS
        .read()
        .expect("tokenizer registry poisoned")
        .get(model)
    {
        return Arc::clone(bpe);
    }

    // Unknown models fall back to cl100k_base, the encoding shared by the
    // embedding model families this crate targets.
    let bpe = tiktoken_rs::get_bpe_from_model(model)
        .or_else(|_| tiktoken_rs::cl100k_base())
        .expect("cl100k_base encoding is bundled");
    let bpe = Arc::new(bpe);

    let mut registry = ENCODINGS.write().expect("tokenizer registry poisoned");
    Arc::clone(registry.entry(model.to_string()).or_insert(bpe))
}

/// Count tokens in text for the given model
pub fn count_tokens(text: &str, model: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    encoding_for(model).encode_ordinary(text).len()
}

/// Truncate text to at most `max_tokens` tokens
///
/// Decodes from token ids so a code point is never split. Text already
/// under the limit is returned unchanged.
pub fn truncate_to_tokens(text: &str, max_tokens: usize, model: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let bpe = encoding_for(model);
    let tokens = bpe.encode_ordinary(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }

    // A cut can land inside a multi-byte code point; back off until the
    // prefix decodes cleanly
    let mut end = max_tokens;
    while end > 0 {
        if let Ok(prefix) = bpe.decode(tokens[..end].to_vec()) {
            return prefix;
        }
        end -= 1;
    }
    String::new()
}

/// Return the text of the trailing `tokens` tokens
///
/// Used to build chunk overlap; the prefix of the successor chunk must
/// equal the decoded suffix of its predecessor exactly.
pub fn tail_tokens(text: &str, tokens: usize, model: &str) -> String {
    if text.is_empty() || tokens == 0 {
        return String::new();
    }

    let bpe = encoding_for(model);
    let ids = bpe.encode_ordinary(text);
    if ids.len() <= tokens {
        return text.to_string();
    }

    // Advance past any cut that would split a code point
    let mut start = ids.len() - tokens;
    while start < ids.len() {
        if let Ok(suffix) = bpe.decode(ids[start..].to_vec()) {
            return suffix;
        }
        start += 1;
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MODEL: &str = "text-embedding-3-small";

    #[test]
    fn test_empty_text_counts_zero() {
        assert_eq!(count_tokens("", MODEL), 0);
    }

    #[test]
    fn test_count_is_stable() {
        let text = "The system shall verify all requirements.";
        assert_eq!(count_tokens(text, MODEL), count_tokens(text, MODEL));
        assert!(count_tokens(text, MODEL) > 0);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        // Must not panic; cl100k_base handles any model id
        assert!(count_tokens("hello world", "no-such-model-v99") > 0);
    }

    #[test]
    fn test_truncate_under_limit_is_identity() {
        let text = "Hi";
        assert_eq!(truncate_to_tokens(text, 100, MODEL), text);
    }

    #[test]
    fn test_truncate_respects_limit() {
        let text = "This is a longer piece of text that will certainly be truncated.";
        let truncated = truncate_to_tokens(text, 5, MODEL);
        assert!(count_tokens(&truncated, MODEL) <= 5);
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn test_tail_tokens_matches_suffix() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let tail = tail_tokens(text, 3, MODEL);
        assert!(count_tokens(&tail, MODEL) <= 3);
        assert!(text.ends_with(&tail));
    }

    #[test]
    fn test_tail_tokens_whole_text_when_short() {
        let text = "short";
        assert_eq!(tail_tokens(text, 50, MODEL), text);
    }

    proptest! {
        #[test]
        fn prop_truncation_never_exceeds_limit(
            t in "[a-zA-Z0-9 ,.]{0,200}",
            n in 0usize..64,
        ) {
            let truncated = truncate_to_tokens(&t, n, MODEL);
            prop_assert!(count_tokens(&truncated, MODEL) <= n);
        }

        #[test]
        fn prop_truncation_yields_valid_utf8_prefix(t in "[a-zA-Z0-9 àéü你好]{0,80}") {
            // decode() must never split a code point; the result is a
            // well-formed string or the original text
            let truncated = truncate_to_tokens(&t, 4, MODEL);
            prop_assert!(truncated.is_char_boundary(truncated.len()));
        }
    }
}
