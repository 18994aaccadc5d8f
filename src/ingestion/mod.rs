//! Ingestion orchestration across files.

pub mod orchestrator;
pub mod types;

use async_trait::async_trait;

pub use orchestrator::IngestionOrchestrator;
pub use types::{
    EmbeddedChunk, IngestionError, IngestionResult, IngestionStatus, IngestionSummary,
    SingleFileOutcome, UploadReport,
};

use crate::extraction::UploadedFile;
use crate::metrics::MetricsSnapshot;

/// Abstraction over the ingestion pipeline used by the HTTP surface.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Ingest an upload of one or more files.
    async fn upload(
        &self,
        files: Vec<UploadedFile>,
        workers: Option<usize>,
    ) -> Result<UploadReport, IngestionError>;

    /// Whether the vector index currently answers.
    async fn index_reachable(&self) -> bool;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}
