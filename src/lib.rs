#![deny(missing_docs)]

//! Core library for the knowledge ingestion pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Text chunking contract and the default token chunker.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding providers and the concurrent batcher.
pub mod embedding;
/// Format-aware text and table extraction.
pub mod extraction;
/// Answer generation over retrieved context.
pub mod generation;
/// OpenSearch k-NN index integration.
pub mod index;
/// File-level pipeline orchestration.
pub mod ingestion;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Query-side passage retrieval.
pub mod retrieval;
