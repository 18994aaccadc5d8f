//! Pipeline sequencing for single files and multi-file uploads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::IngestionApi;
use super::types::{
    EmbeddedChunk, IngestionError, IngestionResult, SingleFileOutcome, UploadReport,
};
use crate::chunking::{Chunk, ChunkMetadata, Chunker, TokenChunker, content_digest};
use crate::config::Config;
use crate::embedding::{EmbeddingBatcher, EmbeddingGenerator, build_provider};
use crate::extraction::{DocumentExtractor, ExtractedDocument, TableAwareExtractor, UploadedFile};
use crate::index::{OpenSearchStore, VectorStore};
use crate::metrics::{IngestMetrics, MetricsSnapshot};

/// Runs extract, chunk, embed and store for uploaded files.
///
/// Every collaborator is injected at construction and shared through an `Arc`; the
/// orchestrator itself holds no per-call state, so one instance serves concurrent uploads.
pub struct IngestionOrchestrator {
    extractor: Arc<dyn DocumentExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
    metrics: Arc<IngestMetrics>,
    max_workers: usize,
}

impl IngestionOrchestrator {
    /// Assemble an orchestrator from explicit collaborators.
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingGenerator>,
        store: Arc<dyn VectorStore>,
        max_workers: usize,
    ) -> Self {
        Self {
            extractor,
            chunker,
            embedder,
            store,
            metrics: Arc::new(IngestMetrics::new()),
            max_workers,
        }
    }

    /// Build the production pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, IngestionError> {
        let provider = build_provider(config)?;
        let embedder = EmbeddingBatcher::new(provider, config.embedding_concurrency);
        let store = OpenSearchStore::new(config)?;
        Ok(Self::new(
            Arc::new(TableAwareExtractor::from_config(config)),
            Arc::new(TokenChunker::from_config(config)),
            Arc::new(embedder),
            Arc::new(store),
            config.ingest_max_workers,
        ))
    }

    /// Store used for writes, exposed for query-side collaborators.
    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    /// Embedder used for writes, exposed for query-side collaborators.
    pub fn embedder(&self) -> Arc<dyn EmbeddingGenerator> {
        Arc::clone(&self.embedder)
    }

    /// Extract, chunk and embed one file, returning the vectors without persisting them.
    pub async fn process_single(
        &self,
        file: &UploadedFile,
    ) -> Result<SingleFileOutcome, IngestionError> {
        let (document, chunks) = self
            .extract_and_chunk(file, content_digest(&file.content))
            .await?;

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self.embedder.embed_one(&chunk.content).await;
            embedded.push(EmbeddedChunk { chunk, embedding });
        }

        tracing::info!(
            filename = %document.filename,
            chunks = embedded.len(),
            embedded = embedded.iter().filter(|item| item.embedding.is_some()).count(),
            "Processed single file"
        );
        Ok(SingleFileOutcome {
            document,
            chunks: embedded,
        })
    }

    /// Ingest every file with a bounded worker pool and report per-file outcomes.
    ///
    /// Fails as a whole only when the index is unreachable or cannot be prepared; any
    /// per-file failure becomes an error entry in the report.
    pub async fn ingest_files(
        &self,
        files: Vec<UploadedFile>,
        workers: Option<usize>,
    ) -> Result<UploadReport, IngestionError> {
        if !self.store.probe().await {
            tracing::error!(files = files.len(), "Vector index unreachable; rejecting upload");
            return Err(IngestionError::IndexUnreachable);
        }
        self.store.ensure_index().await?;

        let width = worker_count(workers, files.len(), self.max_workers);
        tracing::info!(files = files.len(), workers = width, "Starting ingestion");

        let keys = source_keys(&files);
        let mut indexed: Vec<(usize, IngestionResult)> = stream::iter(0..files.len())
            .map(|idx| {
                let file = &files[idx];
                let key = keys[idx].clone();
                async move { (idx, self.ingest_one(file, key).await) }
            })
            .buffer_unordered(width)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        let report = UploadReport::new(indexed.into_iter().map(|(_, result)| result).collect());
        tracing::info!(
            total = report.summary.total_files,
            successful = report.summary.successful_files,
            failed = report.summary.failed_files,
            chunks = report.summary.total_chunks_processed,
            embeddings = report.summary.total_embeddings_created,
            "Ingestion finished"
        );
        Ok(report)
    }

    /// Current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn ingest_one(&self, file: &UploadedFile, source_key: String) -> IngestionResult {
        let started = Instant::now();
        let outcome = self.run_pipeline(file, source_key).await;
        let elapsed = Some(started.elapsed().as_secs_f64());

        match outcome {
            Ok((chunks, embeddings)) => {
                self.metrics
                    .record_success(chunks as u64, embeddings as u64);
                tracing::info!(
                    filename = %file.filename,
                    chunks,
                    embeddings,
                    "File ingested"
                );
                IngestionResult::success(&file.filename, chunks, embeddings, elapsed)
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::warn!(filename = %file.filename, error = %error, "File ingestion failed");
                IngestionResult::failure(&file.filename, &error, elapsed)
            }
        }
    }

    async fn run_pipeline(
        &self,
        file: &UploadedFile,
        source_key: String,
    ) -> Result<(usize, usize), IngestionError> {
        let (_, chunks) = self.extract_and_chunk(file, source_key).await?;
        if chunks.is_empty() {
            return Ok((0, 0));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.get_embedding_batch(&texts).await;
        let created = embeddings.values().filter(|value| value.is_some()).count();

        let outcome = self.store.bulk_upsert(&chunks, &embeddings).await?;
        if outcome.skipped > 0 {
            tracing::warn!(
                filename = %file.filename,
                skipped = outcome.skipped,
                "Chunks left unindexed for lack of embeddings"
            );
        }
        Ok((chunks.len(), created))
    }

    async fn extract_and_chunk(
        &self,
        file: &UploadedFile,
        source_key: String,
    ) -> Result<(ExtractedDocument, Vec<Chunk>), IngestionError> {
        let extractor = Arc::clone(&self.extractor);
        let chunker = Arc::clone(&self.chunker);
        let file = file.clone();

        tokio::task::spawn_blocking(move || {
            let document = extractor.process(&file)?;
            let metadata = ChunkMetadata {
                filename: document.filename.clone(),
                source_key,
            };
            let chunks = chunker.chunk(&document.raw_text, &metadata)?;
            Ok::<_, IngestionError>((document, chunks))
        })
        .await
        .map_err(|error| IngestionError::Worker(error.to_string()))?
    }
}

#[async_trait]
impl IngestionApi for IngestionOrchestrator {
    async fn upload(
        &self,
        files: Vec<UploadedFile>,
        workers: Option<usize>,
    ) -> Result<UploadReport, IngestionError> {
        self.ingest_files(files, workers).await
    }

    async fn index_reachable(&self) -> bool {
        self.store.probe().await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Per-file chunk id keys for one upload: the content digest, suffixed with an ordinal when
/// the same name and bytes repeat, so no two files in a batch share chunk ids.
fn source_keys(files: &[UploadedFile]) -> Vec<String> {
    let mut seen: HashMap<(&str, String), usize> = HashMap::new();
    files
        .iter()
        .map(|file| {
            let digest = content_digest(&file.content);
            let repeats = seen.entry((file.filename.as_str(), digest.clone())).or_insert(0);
            let key = if *repeats == 0 {
                digest
            } else {
                format!("{digest}#{repeats}")
            };
            *repeats += 1;
            key
        })
        .collect()
}

/// Width of the per-upload file pool.
fn worker_count(hint: Option<usize>, files: usize, max_workers: usize) -> usize {
    match hint {
        Some(requested) => requested.max(1),
        None if files > 1 => max_workers.min(files).max(1),
        None => 1,
    }
}
