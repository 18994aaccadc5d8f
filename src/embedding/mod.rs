//! Embedding providers and the concurrent batcher.
//!
//! A provider turns a single text into a vector. [`EmbeddingBatcher`] fans a batch of texts
//! out over a provider with bounded concurrency, caches results by exact text, and records
//! per-item failures as absent vectors instead of failing the batch.

pub(crate) mod batcher;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

pub use batcher::{EmbeddingBatcher, EmbeddingGenerator, EmbeddingMap};

use crate::config::{Config, EmbeddingBackend};

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider could not be reached or refused the request.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with a body we could not interpret.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider returned a vector of the wrong size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
}

/// Computes the embedding of one text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Return the vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Build the provider selected by configuration.
pub fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    tracing::info!(
        backend = ?config.embedding_backend,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Initializing embedding provider"
    );
    match config.embedding_backend {
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaEmbeddingProvider::new(
            &config.ollama_url,
            &config.embedding_model,
            config.embedding_dimension,
        )?)),
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbeddingProvider::new(
            config.embedding_dimension,
        ))),
    }
}

/// Provider backed by the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingProvider {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for `model` served at `base_url`.
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self, EmbeddingError> {
        let http = Client::builder()
            .user_agent("knowledge-ingest/embed")
            .build()
            .map_err(|error| {
                EmbeddingError::Unavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingError::Unavailable(format!(
                "Ollama endpoint {} returned 404 (is model '{}' pulled?)",
                self.endpoint(),
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        let vector = body.embeddings.into_iter().next().ok_or_else(|| {
            EmbeddingError::InvalidResponse("Ollama returned no embeddings".into())
        })?;

        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Deterministic offline provider that hashes bytes into a normalized vector.
///
/// Useful for dry runs and tests; similar texts do not map to similar vectors.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    /// Provider producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::Unavailable(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self::encode(text, self.dimension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_provider_returns_first_embedding() {
        let server = MockServer::start_async().await;
        let provider = OllamaEmbeddingProvider::new(&server.base_url(), "bge-m3", 3).unwrap();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body(json!({"model": "bge-m3", "input": "hello"}));
                then.status(200)
                    .json_body(json!({"model": "bge-m3", "embeddings": [[0.1, 0.2, 0.3]]}));
            })
            .await;

        let vector = provider.embed("hello").await.expect("embedding");
        mock.assert();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn ollama_provider_rejects_wrong_dimension() {
        let server = MockServer::start_async().await;
        let provider = OllamaEmbeddingProvider::new(&server.base_url(), "bge-m3", 1024).unwrap();

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({"embeddings": [[0.1, 0.2]]}));
            })
            .await;

        let error = provider.embed("hello").await.expect_err("mismatch");
        assert!(matches!(
            error,
            EmbeddingError::DimensionMismatch {
                expected: 1024,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn ollama_provider_maps_error_status() {
        let server = MockServer::start_async().await;
        let provider = OllamaEmbeddingProvider::new(&server.base_url(), "bge-m3", 3).unwrap();

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("boom");
            })
            .await;

        let error = provider.embed("hello").await.expect_err("error response");
        assert!(matches!(error, EmbeddingError::Unavailable(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn hashing_provider_is_deterministic_and_normalized() {
        let provider = HashingEmbeddingProvider::new(8);
        let first = provider.embed("Xin chào").await.unwrap();
        let second = provider.embed("Xin chào").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
