use super::{Embedder, EmbeddingError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cache key: the vector for a text is only reusable for the same model at
/// the same dimensionality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    text: String,
    model_name: String,
    dimensions: usize,
}

/// Write-through in-memory embedding cache. No eviction; cleared on close.
#[derive(Debug, Default)]
struct EmbeddingCache {
    entries: RwLock<HashMap<CacheKey, Vec<f32>>>,
}

impl EmbeddingCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: CacheKey, embedding: Vec<f32>) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(key, embedding);
    }

    fn clear(&self) {
        self.entries.write().expect("cache lock poisoned").clear();
    }

    fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }
}

/// Wraps an embedder with a keyed in-memory cache. Hits skip the remote
/// call; misses populate the cache after a successful call.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: EmbeddingCache,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::default(),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn key_for(&self, text: &str) -> CacheKey {
        CacheKey {
            text: text.to_string(),
            model_name: self.inner.name(),
            dimensions: self.inner.dimensions(),
        }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = self.key_for(text);
        if let Some(embedding) = self.cache.get(&key) {
            return Ok(embedding);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.set(key, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut uncached_texts = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&self.key_for(text)) {
                Some(embedding) => results[i] = Some(embedding),
                None => {
                    uncached_texts.push(text.clone());
                    uncached_indices.push(i);
                }
            }
        }

        if !uncached_texts.is_empty() {
            let embeddings = self.inner.embed_batch(&uncached_texts).await?;
            if embeddings.len() != uncached_texts.len() {
                return Err(EmbeddingError::Mismatch {
                    expected: uncached_texts.len(),
                    actual: embeddings.len(),
                });
            }

            for ((text, index), embedding) in uncached_texts
                .iter()
                .zip(uncached_indices)
                .zip(embeddings)
            {
                self.cache.set(self.key_for(text), embedding.clone());
                results[index] = Some(embedding);
            }
        }

        Ok(results
            .into_iter()
            .map(|r| r.expect("every slot filled"))
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    async fn close(&self) {
        self.cache.clear();
        self.inner.close().await;
    }
}
