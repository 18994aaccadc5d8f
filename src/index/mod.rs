//! OpenSearch k-NN index integration.

pub mod client;
pub mod mapping;
/// Backoff schedule for transient bulk failures.
pub mod retry;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use client::OpenSearchStore;
pub use types::{BulkOutcome, IndexDocument, IndexError, SearchHit};

use crate::chunking::Chunk;
use crate::embedding::EmbeddingMap;

/// Vector index lifecycle, writes and k-NN reads.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether the cluster answers at all. Never fails.
    async fn probe(&self) -> bool;

    /// Create the index with the fixed mapping unless it already exists.
    async fn ensure_index(&self) -> Result<(), IndexError>;

    /// Write every chunk that has an embedding at the same index; skip the rest.
    async fn bulk_upsert(
        &self,
        chunks: &[Chunk],
        embeddings: &EmbeddingMap,
    ) -> Result<BulkOutcome, IndexError>;

    /// Up to `k` nearest chunks to `vector`, optionally narrowed by a query filter.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, IndexError>;
}
