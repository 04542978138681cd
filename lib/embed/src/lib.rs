//! # Resolve Embed
//!
//! Client for the remote embedding service that turns combined entity text
//! into fixed-dimension dense vectors.
//!
//! The wire contract is small: `POST {base}/embed` with
//! `{"texts": [...], "model_name": "..."}` returns
//! `{"embeddings": [[f32; D], ...], "error": "..."}`, and `GET {base}/health`
//! answers 200 when the service is live. Vectors must be exactly the
//! configured dimension; anything else is an embedding error.
//!
//! [`HttpEmbeddingClient`] batches requests and memoizes results in a bounded
//! cache. [`MockEmbeddingService`] produces deterministic hash-based vectors
//! for tests and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use resolve_core::config::EmbeddingConfig;
use resolve_core::{Error, Result};

/// Text-to-vector service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text. Empty input embeds to the zero vector without a
    /// network round-trip.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Liveness probe.
    async fn health(&self) -> Result<()>;

    /// The vector dimension this service produces.
    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    texts: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    error: String,
}

/// HTTP client for the embedding service with a bounded memoization cache.
///
/// The cache never evicts: once full, new entries are simply not inserted.
/// That keeps the hot ingest path allocation-free without an eviction policy
/// to tune.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    url: String,
    model_name: String,
    dimension: usize,
    batch_size: usize,
    cache: RwLock<HashMap<String, Vec<f32>>>,
    cache_size: usize,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
            dimension: config.embedding_dim,
            batch_size: if config.batch_size == 0 {
                32
            } else {
                config.batch_size
            },
            cache: RwLock::new(HashMap::new()),
            cache_size: config.cache_size,
        })
    }

    fn cached(&self, text: &str) -> Option<Vec<f32>> {
        self.cache.read().get(text).cloned()
    }

    fn cache_insert(&self, text: &str, vector: &[f32]) {
        let mut cache = self.cache.write();
        if cache.len() < self.cache_size {
            cache.insert(text.to_string(), vector.to_vec());
        }
    }

    /// Issue one wire request for up to `batch_size` texts.
    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            texts,
            model_name: if self.model_name.is_empty() {
                None
            } else {
                Some(&self.model_name)
            },
        };

        let response = self
            .client
            .post(format!("{}/embed", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Cancelled(format!("embedding request timed out: {e}"))
                } else {
                    Error::Embedding(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "unexpected status {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("malformed response: {e}")))?;

        if !parsed.error.is_empty() {
            return Err(Error::Embedding(parsed.error));
        }
        if parsed.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        for vector in &parsed.embeddings {
            if vector.len() != self.dimension {
                return Err(Error::Embedding(format!(
                    "invalid vector dimension: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        if let Some(vector) = self.cached(text) {
            return Ok(vector);
        }

        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| Error::Embedding("empty response from embedding service".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Serve entirely from cache when possible.
        {
            let cache = self.cache.read();
            if let Some(hit) = texts
                .iter()
                .map(|t| cache.get(t).cloned())
                .collect::<Option<Vec<_>>>()
            {
                return Ok(hit);
            }
        }

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!(count = chunk.len(), "requesting embeddings");
            let embeddings = self.request(chunk).await?;
            for (text, vector) in chunk.iter().zip(&embeddings) {
                self.cache_insert(text, vector);
            }
            results.extend(embeddings);
        }

        Ok(results)
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.url))
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("health request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Embedding(format!(
                "health check failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedding stand-in for tests and offline runs.
///
/// Hashes character trigrams and word tokens into a fixed-dimension vector
/// and normalizes it, so similar texts land near each other under cosine
/// distance without any model in the loop.
pub struct MockEmbeddingService {
    dimension: usize,
}

impl MockEmbeddingService {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn trigrams(text: &str) -> HashSet<String> {
        let padded = format!("  {text}  ");
        let chars: Vec<char> = padded.chars().collect();
        if chars.len() < 3 {
            return HashSet::new();
        }
        chars.windows(3).map(|w| w.iter().collect()).collect()
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let normalized = text.to_lowercase();

        for trigram in Self::trigrams(&normalized) {
            let mut hasher = DefaultHasher::new();
            trigram.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimension] += 1.0;
        }

        // Whole words contribute more than their trigrams.
        for word in normalized.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimension] += 2.0;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingService for MockEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        Ok(self.hash_to_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut result = Vec::with_capacity(texts.len());
        for text in texts {
            result.push(self.embed(text).await?);
        }
        Ok(result)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let service = MockEmbeddingService::new(64);
        let a = service.embed("acme widgets").await.unwrap();
        let b = service.embed("acme widgets").await.unwrap();
        let c = service.embed("zebra holdings").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_mock_vectors_are_normalized() {
        let service = MockEmbeddingService::new(64);
        let v = service.embed("acme widgets").await.unwrap();
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_similar_texts_are_close() {
        let service = MockEmbeddingService::new(128);
        let a = service.embed("acme widgets new york").await.unwrap();
        let b = service.embed("acme widgets new jersey").await.unwrap();
        let c = service.embed("quartz mining ltd perth").await.unwrap();

        let cos = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(a, b)| a * b).sum() };
        assert!(cos(&a, &b) > cos(&a, &c));
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let service = MockEmbeddingService::new(16);
        let v = service.embed("").await.unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let service = MockEmbeddingService::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let batch = service.embed_batch(&texts).await.unwrap();
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(*vector, service.embed(text).await.unwrap());
        }
    }
}
