use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};

use super::EmbeddingProvider;

/// One entry per input index; `None` marks a text whose embedding could not be computed.
pub type EmbeddingMap = BTreeMap<usize, Option<Vec<f32>>>;

/// Batch-level embedding interface consumed by the orchestrator.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed every text concurrently. Never fails as a whole.
    async fn get_embedding_batch(&self, texts: &[String]) -> EmbeddingMap;

    /// Embed a single text with the same cache and failure policy.
    async fn embed_one(&self, text: &str) -> Option<Vec<f32>>;
}

/// Bounded-concurrency, cached batch embedder.
///
/// The cache is keyed by exact text and lives as long as the batcher; it has no eviction.
/// Concurrent misses on the same text may both reach the provider, the last write wins.
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    cache: DashMap<String, Vec<f32>>,
    concurrency: usize,
}

impl EmbeddingBatcher {
    /// Wrap `provider`, running at most `concurrency` requests at a time per batch.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, concurrency: usize) -> Self {
        Self {
            provider,
            cache: DashMap::new(),
            concurrency: concurrency.max(1),
        }
    }

    /// Number of cached vectors.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl EmbeddingGenerator for EmbeddingBatcher {
    async fn get_embedding_batch(&self, texts: &[String]) -> EmbeddingMap {
        let mut results: EmbeddingMap = (0..texts.len()).map(|idx| (idx, None)).collect();

        let computed: Vec<(usize, Option<Vec<f32>>)> = stream::iter(0..texts.len())
            .map(|idx| {
                let text = texts[idx].as_str();
                async move { (idx, self.embed_one(text).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (idx, vector) in computed {
            results.insert(idx, vector);
        }

        let missing = results.values().filter(|value| value.is_none()).count();
        tracing::debug!(
            total = texts.len(),
            missing,
            concurrency = self.concurrency,
            "Embedding batch finished"
        );
        results
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Some(hit.value().clone());
        }

        match self.provider.embed(text).await {
            Ok(vector) => {
                self.cache.insert(text.to_string(), vector.clone());
                Some(vector)
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    characters = text.len(),
                    "Embedding failed; recording absent vector"
                );
                None
            }
        }
    }
}
