//! Local Neural Embeddings
//!
//! Uses fastembed for local ONNX inference with all-MiniLM-L6-v2
//! (384 dimensions, truncated to the configured index dimension).
//! The model is a heavy singleton: loaded lazily behind a `OnceLock`
//! and shared process-wide.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{truncate_normalize, EmbedError, Embedder, InputType};

/// Stable identifier for the local model
pub const LOCAL_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Maximum text length for embedding (truncated if longer)
const MAX_TEXT_LENGTH: usize = 8192;

/// Internal fastembed batch size
const MODEL_BATCH_SIZE: usize = 32;

/// Lazily-initialized shared model handle
static EMBEDDING_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Model cache directory: LOUPE_FASTEMBED_CACHE overrides the platform
/// cache directory
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("LOUPE_FASTEMBED_CACHE") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "loupe", "loupe") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbedError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create model cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize all-MiniLM-L6-v2: {}. \
                 Ensure ONNX runtime is available and model files can be downloaded.",
                e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbedError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbedError::ModelInit(err.clone())),
    }
}

/// Truncate at a char boundary at or below `max_bytes`
fn truncate_text(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Local fastembed-backed embedder
pub struct LocalEmbedder {
    dimension: usize,
}

impl LocalEmbedder {
    /// Construct with the index dimension; vectors are truncated and
    /// re-normalized when the model emits more dimensions.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.clamp(8, 384),
        }
    }

    /// Whether the model can be loaded (triggers download on first call)
    pub fn is_ready(&self) -> bool {
        match get_model() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Local embedding model not ready: {}", e);
                false
            }
        }
    }

    fn embed_texts(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut model = get_model()?;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MODEL_BATCH_SIZE) {
            let embeddings = model
                .embed(chunk.to_vec(), None)
                .map_err(|e| EmbedError::EmbeddingFailed(e.to_string()))?;
            for embedding in embeddings {
                out.push(truncate_normalize(embedding, self.dimension));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        LOCAL_MODEL_ID
    }

    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        let truncated = truncate_text(text, MAX_TEXT_LENGTH);
        let mut vectors = self.embed_texts(vec![truncated])?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::EmbeddingFailed("No embedding generated".to_string()))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        // Zero vectors for empties keep batch output aligned with input
        let mut non_empty: Vec<&str> = Vec::with_capacity(texts.len());
        let mut empties = Vec::new();
        for (idx, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                empties.push(idx);
            } else {
                non_empty.push(truncate_text(text, MAX_TEXT_LENGTH));
            }
        }

        let embedded = self.embed_texts(non_empty)?;
        let mut out = Vec::with_capacity(texts.len());
        let mut embedded_iter = embedded.into_iter();
        for idx in 0..texts.len() {
            if empties.contains(&idx) {
                out.push(vec![0.0; self.dimension]);
            } else {
                out.push(embedded_iter.next().ok_or_else(|| {
                    EmbedError::EmbeddingFailed("Model returned short batch".to_string())
                })?);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        let text = "héllo wörld";
        let truncated = truncate_text(text, 3);
        assert!(truncated.len() <= 3);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_dimension_is_clamped() {
        assert_eq!(LocalEmbedder::new(10_000).dimension(), 384);
        assert_eq!(LocalEmbedder::new(0).dimension(), 8);
    }
}
