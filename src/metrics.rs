use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    chunks_processed: AtomicU64,
    embeddings_created: AtomicU64,
    chunks_skipped: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file that made it through the whole pipeline.
    pub fn record_success(&self, chunks: u64, embeddings: u64) {
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed.fetch_add(chunks, Ordering::Relaxed);
        self.embeddings_created
            .fetch_add(embeddings, Ordering::Relaxed);
        self.chunks_skipped
            .fetch_add(chunks.saturating_sub(embeddings), Ordering::Relaxed);
    }

    /// Record a file whose processing failed.
    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            embeddings_created: self.embeddings_created.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files ingested successfully since startup.
    pub files_succeeded: u64,
    /// Files that ended in an error entry.
    pub files_failed: u64,
    /// Chunks produced across successful files.
    pub chunks_processed: u64,
    /// Embeddings computed across successful files.
    pub embeddings_created: u64,
    /// Chunks left out of the index for lack of an embedding.
    pub chunks_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_files_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_success(5, 4);
        metrics.record_success(3, 3);
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_succeeded, 2);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.chunks_processed, 8);
        assert_eq!(snapshot.embeddings_created, 7);
        assert_eq!(snapshot.chunks_skipped, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(IngestMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
