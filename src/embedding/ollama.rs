use super::{Embedder, EmbeddingError};
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const BACKOFF_BASE_MS: u64 = 500;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Embedding client for an Ollama-compatible HTTP model server.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    server_url: String,
    model_name: String,
    dimensions: usize,
    batch_size: usize,
    max_attempts: u32,
    base_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self::with_model(config, &config.model_name)
    }

    /// Build a client for a specific model, sharing the rest of the
    /// embedding configuration. Used to assemble fallback chains.
    pub fn with_model(config: &EmbeddingConfig, model_name: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_url: config.server_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.max(1),
            base_timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Cheap availability probe used at daemon startup.
    pub async fn probe(&self) -> Result<(), EmbeddingError> {
        let texts = ["ping".to_string()];
        self.request_batch(&texts, PROBE_TIMEOUT).await.map(|_| ())
    }

    async fn request_batch(
        &self,
        texts: &[String],
        timeout: Duration,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.server_url);
        let request = EmbedRequest {
            model: &self.model_name,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!(
                "server returned {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Request(format!("invalid response body: {e}")))?;

        Ok(parsed.embeddings)
    }

    async fn embed_sub_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let timeout = dynamic_timeout(self.base_timeout, texts);
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            debug!(
                model = %self.model_name,
                batch = texts.len(),
                ?timeout,
                attempt = attempt + 1,
                max = self.max_attempts,
                "requesting embeddings"
            );

            match self.request_batch(texts, timeout).await {
                Ok(embeddings)
                    if embeddings.len() == texts.len()
                        && embeddings.iter().all(|e| !e.is_empty()) =>
                {
                    return Ok(embeddings);
                }
                Ok(embeddings) => {
                    warn!(
                        expected = texts.len(),
                        actual = embeddings.len(),
                        "short embedding response, retrying"
                    );
                    last_error = Some(EmbeddingError::Mismatch {
                        expected: texts.len(),
                        actual: embeddings.len(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "embedding request failed");
                    last_error = Some(e);
                }
            }

            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(match last_error {
            Some(EmbeddingError::Mismatch { expected, actual }) => {
                EmbeddingError::Mismatch { expected, actual }
            }
            Some(e) => EmbeddingError::Unavailable(format!(
                "{} failed after {} attempts: {e}",
                self.model_name, self.max_attempts
            )),
            None => EmbeddingError::Unavailable(format!(
                "{} failed after {} attempts",
                self.model_name, self.max_attempts
            )),
        })
    }
}

/// Request timeout scaled to the longest text in the batch: one extra second
/// per 5000 bytes past the first 5000. Short inputs use just the base.
fn dynamic_timeout(base: Duration, texts: &[String]) -> Duration {
    let longest = texts.iter().map(String::len).max().unwrap_or(0);
    if longest <= 5000 {
        return base;
    }
    base + Duration::from_secs(((longest - 5000) / 5000 + 1) as u64)
}

/// Exponential backoff: 500ms · 2^attempt.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << attempt.min(16))
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Ok(vec![0.0; self.dimensions]);
        }

        let texts = [text.to_string()];
        let mut embeddings = self.embed_sub_batch(&texts).await?;
        Ok(embeddings.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_sub_batch(batch).await?;
            all.extend(embeddings);
        }

        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> String {
        self.model_name.clone()
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_timeout_short_input_uses_base() {
        let base = Duration::from_secs(60);
        let texts = vec!["short".to_string()];
        assert_eq!(dynamic_timeout(base, &texts), base);
    }

    #[test]
    fn dynamic_timeout_scales_with_longest_text() {
        let base = Duration::from_secs(60);
        let texts = vec!["a".repeat(12_000), "tiny".to_string()];
        // 12000 bytes: (12000 - 5000) / 5000 + 1 = 2 extra seconds.
        assert_eq!(dynamic_timeout(base, &texts), Duration::from_secs(62));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn embed_empty_text_returns_zero_vector() {
        let config = EmbeddingConfig {
            dimensions: 4,
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config);
        let vector = embedder.embed("").await.expect("zero vector");
        assert_eq!(vector, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn embed_batch_empty_input_returns_empty() {
        let embedder = OllamaEmbedder::new(&EmbeddingConfig::default());
        let vectors = embedder.embed_batch(&[]).await.expect("empty");
        assert!(vectors.is_empty());
    }
}
