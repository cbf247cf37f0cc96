use super::{Embedder, EmbeddingError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Composite embedder over an ordered list of providers.
///
/// Calls go to the current provider first; on failure the remaining
/// providers are tried in order and the first one to succeed becomes
/// current. `dimensions()` and `name()` reflect the current provider.
pub struct FallbackEmbedder {
    embedders: Vec<Arc<dyn Embedder>>,
    current: AtomicUsize,
}

impl FallbackEmbedder {
    pub fn new(embedders: Vec<Arc<dyn Embedder>>) -> Result<Self, EmbeddingError> {
        if embedders.is_empty() {
            return Err(EmbeddingError::Unavailable(
                "no embedding providers configured".to_string(),
            ));
        }
        Ok(Self {
            embedders,
            current: AtomicUsize::new(0),
        })
    }

    fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire).min(self.embedders.len() - 1)
    }

    fn promote(&self, index: usize) {
        let previous = self.current.swap(index, Ordering::Release);
        if previous != index {
            info!(
                from = %self.embedders[previous].name(),
                to = %self.embedders[index].name(),
                "switched embedding provider"
            );
        }
    }

    /// Candidate order: current provider first, then the rest in list order.
    fn candidate_order(&self) -> Vec<usize> {
        let current = self.current_index();
        let mut order = vec![current];
        order.extend((0..self.embedders.len()).filter(|i| *i != current));
        order
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut last_error = None;
        for index in self.candidate_order() {
            match self.embedders[index].embed(text).await {
                Ok(embedding) => {
                    self.promote(index);
                    return Ok(embedding);
                }
                Err(e) => {
                    warn!(provider = %self.embedders[index].name(), error = %e, "provider failed");
                    last_error = Some(e);
                }
            }
        }
        Err(EmbeddingError::Unavailable(format!(
            "all embedding providers failed (last: {})",
            last_error.map_or_else(|| "none tried".to_string(), |e| e.to_string())
        )))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut last_error = None;
        for index in self.candidate_order() {
            match self.embedders[index].embed_batch(texts).await {
                Ok(embeddings) => {
                    self.promote(index);
                    return Ok(embeddings);
                }
                Err(e) => {
                    warn!(provider = %self.embedders[index].name(), error = %e, "provider failed");
                    last_error = Some(e);
                }
            }
        }
        Err(EmbeddingError::Unavailable(format!(
            "all embedding providers failed (last: {})",
            last_error.map_or_else(|| "none tried".to_string(), |e| e.to_string())
        )))
    }

    fn dimensions(&self) -> usize {
        self.embedders[self.current_index()].dimensions()
    }

    fn name(&self) -> String {
        self.embedders[self.current_index()].name()
    }

    async fn close(&self) {
        for embedder in &self.embedders {
            embedder.close().await;
        }
    }
}
