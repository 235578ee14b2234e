//! Embeddings Module
//!
//! The `Embedder` capability plus its implementations:
//! - Local neural model via fastembed (feature `embeddings`)
//! - OpenAI-style remote API (feature `remote-embeddings`)
//! - Deterministic hash embedder, always available as last resort
//!
//! Plus the content-addressed LRU cache and the batch processor with
//! bounded concurrency, retry, and rate limiting.

mod batch;
mod cache;
mod hash;
#[cfg(feature = "embeddings")]
mod local;
#[cfg(feature = "remote-embeddings")]
mod remote;

pub use batch::{BatchConfig, BatchItem, BatchOutput, BatchProcessor, BatchProgress};
pub use cache::{CacheStats, EmbeddingCache, DEFAULT_CACHE_CAPACITY};
pub use hash::{HashEmbedder, HASH_MODEL_ID};
#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;
#[cfg(feature = "remote-embeddings")]
pub use remote::RemoteEmbedder;

use async_trait::async_trait;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EmbedError {
    /// Failed to initialize the embedding model
    ModelInit(String),
    /// Failed to generate an embedding
    EmbeddingFailed(String),
    /// Invalid input
    InvalidInput(String),
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::ModelInit(e) => write!(f, "Model initialization failed: {}", e),
            EmbedError::EmbeddingFailed(e) => write!(f, "Embedding generation failed: {}", e),
            EmbedError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
        }
    }
}

impl std::error::Error for EmbedError {}

// ============================================================================
// CAPABILITY
// ============================================================================

/// Query/document asymmetry hint for models that distinguish them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputType {
    /// A retrieval query
    Query,
    /// Indexed content
    #[default]
    Document,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Query => "query",
            InputType::Document => "document",
        }
    }
}

/// The embedding capability the engine depends on.
///
/// Contract: empty input returns a zero vector of the correct
/// dimension; `embed_batch` preserves input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Uniform output dimension
    fn dimension(&self) -> usize;

    /// Stable model identifier; a change invalidates all stored vectors
    fn model_id(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str, input_type: InputType) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch, preserving input order
    async fn embed_batch(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, input_type).await?);
        }
        Ok(out)
    }
}

// ============================================================================
// VECTOR HELPERS
// ============================================================================

/// Serialize a vector as little-endian f32 bytes for blob storage
pub fn vec_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize little-endian f32 bytes; trailing partial floats are dropped
pub fn vec_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Truncate a vector to `dim` and L2-normalize in place.
/// For models trained with Matryoshka representation learning the first
/// N dimensions are themselves a valid N-dim embedding.
pub fn truncate_normalize(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() > dim {
        vector.truncate(dim);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
