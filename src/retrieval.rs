//! Query-side k-NN retrieval over the chunk index.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::embedding::EmbeddingGenerator;
use crate::index::{SearchHit, VectorStore};

/// Finds passages relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` ranked passages for `query`. Returns an empty list on any failure.
    async fn retrieve(&self, query: &str, k: usize, filter: Option<Value>) -> Vec<SearchHit>;
}

/// Embeds the query with the ingestion embedder and searches the vector store.
pub struct KnnRetriever {
    embedder: Arc<dyn EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
}

impl KnnRetriever {
    /// Retriever sharing the given embedder and store.
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl Retriever for KnnRetriever {
    async fn retrieve(&self, query: &str, k: usize, filter: Option<Value>) -> Vec<SearchHit> {
        if k == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let Some(vector) = self.embedder.embed_one(query).await else {
            tracing::warn!(characters = query.len(), "Query embedding failed; returning no passages");
            return Vec::new();
        };

        match self.store.search(&vector, k, filter).await {
            Ok(mut hits) => {
                hits.truncate(k);
                hits
            }
            Err(error) => {
                tracing::warn!(error = %error, "Search failed; returning no passages");
                Vec::new()
            }
        }
    }
}
