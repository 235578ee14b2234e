//! Remote Embedding API
//!
//! OpenAI-style embeddings endpoint client. The API key is read from
//! the environment at construction; a missing key is a configuration
//! error raised synchronously, never a silent fallback.

use async_trait::async_trait;
use serde::Deserialize;

use super::{truncate_normalize, EmbedError, Embedder, InputType};
use crate::config::ConfigError;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "LOUPE_EMBED_API_KEY";

/// Default endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// Remote API-backed embedder
pub struct RemoteEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl RemoteEmbedder {
    /// Construct from the model name and index dimension; reads the
    /// API key from [`API_KEY_ENV`].
    pub fn new(model: &str, dimension: usize, endpoint: Option<&str>) -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            api_key,
            model: model.to_string(),
            dimension,
        })
    }

    async fn request(&self, inputs: &[&str], input_type: InputType) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
            "encoding_format": "float",
            "input_type": input_type.as_str(),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::EmbeddingFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EmbedError::EmbeddingFailed(format!(
                "Embedding API returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::EmbeddingFailed(format!("Malformed response: {}", e)))?;

        if parsed.data.len() != inputs.len() {
            return Err(EmbedError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|row| truncate_normalize(row.embedding, self.dimension))
            .collect())
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, input_type: InputType) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        let mut vectors = self.request(&[text], input_type).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::EmbeddingFailed("Empty response".to_string()))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
        self.request(&refs, input_type).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_config_error() {
        // The test environment does not define the key
        if std::env::var(API_KEY_ENV).is_ok() {
            return;
        }
        let result = RemoteEmbedder::new("text-embedding-3-small", 256, None);
        assert!(matches!(result, Err(ConfigError::MissingApiKey(_))));
    }
}
