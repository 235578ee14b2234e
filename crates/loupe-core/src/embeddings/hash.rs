//! Deterministic Hash Embedder
//!
//! Offline last-resort embedder: tokenizes identifiers (non-word and
//! camelCase splits), hashes each token under three salts into a
//! fixed-dimension vector, adds bigram features, and L2-normalizes.
//! Identical text always produces the identical vector, so retrieval
//! stays functional with no model assets at all.

use async_trait::async_trait;

use super::{EmbedError, Embedder, InputType};

/// Stable identifier for the hash embedder
pub const HASH_MODEL_ID: &str = "hash-v1";

const SALTS: [u64; 3] = [0x9e3779b97f4a7c15, 0xc2b2ae3d27d4eb4f, 0x165667b19e3779f9];

/// Weight of bigram features relative to unigrams
const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic, dependency-free embedder
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    /// Split text into lowercase tokens on non-word boundaries and
    /// camelCase humps; `validateEmail` yields `validate` and `email`.
    fn tokenize(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
            if raw.is_empty() {
                continue;
            }
            for word in raw.split('_') {
                if word.is_empty() {
                    continue;
                }
                let mut current = String::new();
                let mut prev_lower = false;
                for c in word.chars() {
                    if c.is_uppercase() && prev_lower && !current.is_empty() {
                        tokens.push(current.to_lowercase());
                        current = String::new();
                    }
                    prev_lower = c.is_lowercase() || c.is_numeric();
                    current.push(c);
                }
                if !current.is_empty() {
                    tokens.push(current.to_lowercase());
                }
            }
        }
        tokens
    }

    /// FNV-1a style salted token hash
    fn hash_token(token: &str, salt: u64) -> u64 {
        let mut h = 0xcbf29ce484222325_u64 ^ salt;
        for byte in token.as_bytes() {
            h ^= *byte as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    fn add_feature(&self, vector: &mut [f32], token: &str, weight: f32) {
        for salt in SALTS {
            let h = Self::hash_token(token, salt);
            let idx = (h % self.dimension as u64) as usize;
            // Sign bit keeps the expected dot product of unrelated
            // texts near zero
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign * weight;
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        if text.trim().is_empty() {
            return vector;
        }

        let tokens = Self::tokenize(text);
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, &bigram, BIGRAM_WEIGHT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        HASH_MODEL_ID
    }

    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn test_tokenize_camel_and_snake() {
        assert_eq!(
            HashEmbedder::tokenize("validateEmail"),
            vec!["validate", "email"]
        );
        assert_eq!(
            HashEmbedder::tokenize("snake_case_name"),
            vec!["snake", "case", "name"]
        );
        assert_eq!(
            HashEmbedder::tokenize("HTTPServer"),
            vec!["httpserver"]
        );
    }

    #[test]
    fn test_deterministic_across_calls() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed_sync("function that validates email addresses");
        let b = embedder.embed_sync("function that validates email addresses");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input_is_zero_vector() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_sync("   ");
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_output_is_normalized() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed_sync("calculate the total tax");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_related_text_more_similar_than_unrelated() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_sync("validates email addresses");
        let relevant = embedder.embed_sync("function validateEmail(email) checks email format");
        let unrelated = embedder.embed_sync("binary tree rotation and rebalancing");

        assert!(
            cosine_similarity(&query, &relevant) > cosine_similarity(&query, &unrelated)
        );
    }

    #[test]
    fn test_batch_preserves_order() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let batch = rt
            .block_on(embedder.embed_batch(&texts, InputType::Document))
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], embedder.embed_sync("alpha"));
        assert_eq!(batch[2], embedder.embed_sync("gamma"));
    }
}
