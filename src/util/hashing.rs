//! Content hashing for chunk deduplication

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of normalized text
///
/// Normalization: strip leading/trailing whitespace and convert
/// `\r\n` to `\n`. Internal whitespace is preserved, so `"a  b"` and
/// `"a b"` hash differently. This is the deduplication key for chunks.
pub fn content_hash(text: &str) -> String {
    let normalized = text.trim().replace("\r\n", "\n");
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}
