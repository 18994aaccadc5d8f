//! Result types and errors for the ingestion pipeline.

use serde::Serialize;
use thiserror::Error;

use crate::chunking::{Chunk, ChunkingError};
use crate::embedding::EmbeddingError;
use crate::extraction::{ExtractedDocument, ExtractionError};
use crate::index::IndexError;

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Extraction step failed for a file.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunker rejected the extracted text.
    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkingError),
    /// Index interaction failed.
    #[error("Index request failed: {0}")]
    Index(#[from] IndexError),
    /// Pre-flight probe found no cluster; nothing was attempted.
    #[error("Vector index is unreachable")]
    IndexUnreachable,
    /// A blocking worker panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(String),
    /// Embedding provider could not be constructed.
    #[error("Embedding setup failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Outcome of a single file in a multi-file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    /// File was extracted, chunked, embedded and written.
    Success,
    /// File failed at some step; see `error`.
    Error,
}

/// Per-file entry of an [`UploadReport`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    /// Source file name.
    pub filename: String,
    /// Final status.
    pub status: IngestionStatus,
    /// Human-readable summary of what happened.
    pub message: String,
    /// Chunks produced for the file.
    pub processed_chunks: usize,
    /// Embeddings computed for those chunks.
    pub embeddings_created: usize,
    /// Wall-clock seconds spent on the file.
    pub processing_time: Option<f64>,
    /// Failure cause when `status` is `error`.
    pub error: Option<String>,
}

impl IngestionResult {
    /// Entry for a file that went through every step.
    pub fn success(
        filename: impl Into<String>,
        processed_chunks: usize,
        embeddings_created: usize,
        processing_time: Option<f64>,
    ) -> Self {
        Self {
            filename: filename.into(),
            status: IngestionStatus::Success,
            message: format!(
                "Processed {processed_chunks} chunk(s), created {embeddings_created} embedding(s)"
            ),
            processed_chunks,
            embeddings_created,
            processing_time,
            error: None,
        }
    }

    /// Entry for a file that failed.
    pub fn failure(
        filename: impl Into<String>,
        error: &IngestionError,
        processing_time: Option<f64>,
    ) -> Self {
        Self {
            filename: filename.into(),
            status: IngestionStatus::Error,
            message: "Failed to process file".to_string(),
            processed_chunks: 0,
            embeddings_created: 0,
            processing_time,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate counts over an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    /// Files in the upload.
    pub total_files: usize,
    /// Files with status `success`.
    pub successful_files: usize,
    /// Files with status `error`.
    pub failed_files: usize,
    /// Sum of `processed_chunks`.
    pub total_chunks_processed: usize,
    /// Sum of `embeddings_created`.
    pub total_embeddings_created: usize,
}

impl IngestionSummary {
    /// Summary of a single result.
    pub fn of(result: &IngestionResult) -> Self {
        let success = result.status == IngestionStatus::Success;
        Self {
            total_files: 1,
            successful_files: usize::from(success),
            failed_files: usize::from(!success),
            total_chunks_processed: result.processed_chunks,
            total_embeddings_created: result.embeddings_created,
        }
    }

    /// Combine two summaries. Associative and commutative, with `default()` as identity.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            total_files: self.total_files + other.total_files,
            successful_files: self.successful_files + other.successful_files,
            failed_files: self.failed_files + other.failed_files,
            total_chunks_processed: self.total_chunks_processed + other.total_chunks_processed,
            total_embeddings_created: self.total_embeddings_created
                + other.total_embeddings_created,
        }
    }

    /// Fold every result into one summary.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a IngestionResult>) -> Self {
        results
            .into_iter()
            .map(Self::of)
            .fold(Self::default(), Self::merge)
    }
}

/// Response of a multi-file upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    /// Aggregate counts.
    pub summary: IngestionSummary,
    /// Per-file entries in input order.
    pub results: Vec<IngestionResult>,
}

impl UploadReport {
    /// Build a report, deriving the summary from `results`.
    pub fn new(results: Vec<IngestionResult>) -> Self {
        Self {
            summary: IngestionSummary::from_results(&results),
            results,
        }
    }
}

/// Chunk returned by the single-file path together with its vector.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedChunk {
    /// The chunk.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Its embedding, absent when the provider failed.
    pub embedding: Option<Vec<f32>>,
}

/// Result of the single-file path. Nothing is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SingleFileOutcome {
    /// Extraction output.
    pub document: ExtractedDocument,
    /// Chunks in position order with their vectors.
    pub chunks: Vec<EmbeddedChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(name: &str) -> IngestionResult {
        IngestionResult::failure(name, &IngestionError::Worker("boom".into()), None)
    }

    #[test]
    fn summary_counts_every_file() {
        let results = vec![
            IngestionResult::success("a.pdf", 3, 2, Some(0.5)),
            failed("b.docx"),
            IngestionResult::success("c.xlsx", 1, 1, None),
        ];
        let summary = IngestionSummary::from_results(&results);
        assert_eq!(
            summary,
            IngestionSummary {
                total_files: 3,
                successful_files: 2,
                failed_files: 1,
                total_chunks_processed: 4,
                total_embeddings_created: 3,
            }
        );
    }

    #[test]
    fn merge_is_order_independent() {
        let a = IngestionSummary::of(&IngestionResult::success("a", 2, 2, None));
        let b = IngestionSummary::of(&failed("b"));
        let c = IngestionSummary::of(&IngestionResult::success("c", 5, 4, None));
        assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(a.merge(IngestionSummary::default()), a);
    }

    #[test]
    fn report_serializes_lowercase_status() {
        let report = UploadReport::new(vec![failed("x.png")]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["results"][0]["status"], "error");
        assert_eq!(value["results"][0]["error"], "Worker task failed: boom");
        assert_eq!(value["summary"]["failed_files"], 1);
    }
}
