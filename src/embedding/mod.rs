pub mod cache;
pub mod fallback;
pub mod ollama;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::CachedEmbedder;
pub use fallback::FallbackEmbedder;
pub use ollama::OllamaEmbedder;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: usize, actual: usize },

    #[error("Embedding request failed: {0}")]
    Request(String),
}

/// A service that maps text spans to fixed-dimension vectors.
///
/// `embed("")` returns a zero vector of the provider's dimension and
/// `embed_batch(&[])` returns an empty list; neither reaches the remote
/// service. Batch results are order-preserving and the same length as the
/// input.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimensions(&self) -> usize;

    fn name(&self) -> String;

    /// Release held resources. Callers must not use the embedder afterwards.
    async fn close(&self);
}
