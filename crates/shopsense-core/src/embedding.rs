//! The embedding provider seam. Anything that turns text into a fixed-length vector.

use async_trait::async_trait;

use crate::ollama::OllamaError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed several strings. Returns one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error("embedding provider returned {found} vectors for {expected} inputs")]
    CountMismatch { expected: usize, found: usize },
    #[error("embedding provider returned an empty vector")]
    EmptyVector,
    #[error("embedding provider failed: {0}")]
    Provider(String),
}
