//! Ollama client for embeddings. Wraps ollama-rs with a simple API.

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;
use url::Url;

use crate::config::DEFAULT_EMBED_MODEL;
use crate::embedding::{EmbedError, Embedder};

/// Parse an Ollama base URL. ollama-rs appends `api/...` to it verbatim, so a path prefix
/// (`http://gateway/ollama`) needs its trailing slash.
pub(crate) fn base_url(url: &str) -> Result<Url, url::ParseError> {
    let mut parsed = Url::parse(url)?;
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

/// Thin wrapper around Ollama for embedding. Build one per process and share it.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
}

impl OllamaClient {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        Ok(Self {
            inner: Ollama::from_url(base_url(url)?),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
        })
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    async fn generate(&self, input: EmbeddingsInput) -> Result<Vec<Vec<f32>>, OllamaError> {
        let req = GenerateEmbeddingsRequest::new(self.embed_model.clone(), input);
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        Ok(res.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        tracing::debug!(model = %self.embed_model, chars = text.len(), "embedding text");
        let vector = self
            .generate(EmbeddingsInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        if vector.is_empty() {
            return Err(EmbedError::EmptyVector);
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(model = %self.embed_model, count = texts.len(), "embedding batch");
        let vectors = self.generate(EmbeddingsInput::Multiple(texts.to_vec())).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                found: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}
