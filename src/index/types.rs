//! Shared types used by the OpenSearch store.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::chunking::Chunk;

/// Errors returned while interacting with OpenSearch.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid OpenSearch URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// OpenSearch responded with an unexpected status code.
    #[error("Unexpected OpenSearch response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the cluster.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The cluster could not be reached at all.
    #[error("OpenSearch unreachable at {0}")]
    Unreachable(String),
    /// A bulk batch failed permanently or exhausted its retries.
    #[error("Bulk write failed after {attempts} attempt(s): {reason}")]
    BulkWriteFailure {
        /// Attempts made for the failing batch.
        attempts: u32,
        /// Last failure observed.
        reason: String,
    },
}

/// Chunk plus its vector, as persisted in the index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument<'a> {
    /// Chunk fields, flattened into the document.
    #[serde(flatten)]
    pub chunk: &'a Chunk,
    /// Embedding of `chunk.content`.
    pub embedding_vector: &'a [f32],
}

/// Result of a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    /// Documents acknowledged by the cluster.
    pub written: usize,
    /// Chunks skipped because their embedding was absent.
    pub skipped: usize,
}

/// One ranked k-NN match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Similarity score computed by OpenSearch.
    pub score: f32,
    /// Stored fields, without the vector.
    pub source: Map<String, Value>,
}

impl SearchHit {
    /// Chunk text of the hit, when present.
    pub fn content(&self) -> Option<&str> {
        self.source.get("content").and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
pub(crate) struct BulkResponse {
    #[serde(default)]
    pub(crate) errors: bool,
    #[serde(default)]
    pub(crate) items: Vec<Map<String, Value>>,
}

impl BulkResponse {
    /// Status of every item, whatever the action name.
    pub(crate) fn item_statuses(&self) -> impl Iterator<Item = u16> + '_ {
        self.items.iter().filter_map(|item| {
            item.values()
                .next()
                .and_then(|action| action.get("status"))
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok())
        })
    }

    /// First item-level error reason, for diagnostics.
    pub(crate) fn first_error(&self) -> Option<String> {
        self.items.iter().find_map(|item| {
            item.values()
                .next()
                .and_then(|action| action.get("error"))
                .map(Value::to_string)
        })
    }
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    pub(crate) hits: SearchHits,
}

#[derive(Deserialize)]
pub(crate) struct SearchHits {
    #[serde(default)]
    pub(crate) hits: Vec<RawHit>,
}

#[derive(Deserialize)]
pub(crate) struct RawHit {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    #[serde(rename = "_score", default)]
    pub(crate) score: Option<f32>,
    #[serde(rename = "_source", default)]
    pub(crate) source: Map<String, Value>,
}
