//! Shared utilities: tokenization, hashing, normativity detection

pub mod hashing;
pub mod normative;
pub mod tokenizer;

/// Encode an embedding vector as little-endian f32 bytes for BLOB storage
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding
        .iter()
        .flat_map(|f| f.to_le_bytes().to_vec())
        .collect()
}

/// Decode an embedding vector from little-endian f32 bytes
pub(crate) fn bytes_to_embedding(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors; 0.0 on mismatched or zero vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_round_trip() {
        let embedding = vec![1.5, -2.3, 0.0, 42.1];
        let bytes = embedding_to_bytes(&embedding);
        let decoded = bytes_to_embedding(&bytes);

        assert_eq!(embedding.len(), decoded.len());
        for (orig, back) in embedding.iter().zip(decoded.iter()) {
            assert!((orig - back).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert_eq!(cosine_similarity(&a, &b), 1.0);
        assert_eq!(cosine_similarity(&a, &c), 0.0);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }
}
