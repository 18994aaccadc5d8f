//! HTTP client wrapper for OpenSearch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

use super::VectorStore;
use super::mapping::index_body;
use super::retry::{RetryConfig, RetryResult, Retryable, with_retry};
use super::types::{
    BulkOutcome, BulkResponse, IndexDocument, IndexError, SearchHit, SearchResponse,
};
use crate::chunking::Chunk;
use crate::config::Config;
use crate::embedding::EmbeddingMap;

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// OpenSearch-backed k-NN chunk store.
pub struct OpenSearchStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) index: String,
    pub(crate) credentials: Option<(String, Option<String>)>,
    pub(crate) dimension: usize,
    pub(crate) batch_size: usize,
    pub(crate) retry: RetryConfig,
}

impl OpenSearchStore {
    /// Construct a store from configuration.
    pub fn new(config: &Config) -> Result<Self, IndexError> {
        let client = Client::builder()
            .user_agent("knowledge-ingest/0.1")
            .timeout(Duration::from_secs(60))
            .build()?;

        let base_url =
            normalize_base_url(&config.opensearch_url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            index = %config.opensearch_index,
            has_credentials = config.opensearch_username.is_some(),
            "Initialized OpenSearch HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            index: config.opensearch_index.clone(),
            credentials: config
                .opensearch_username
                .clone()
                .map(|user| (user, config.opensearch_password.clone())),
            dimension: config.embedding_dimension,
            batch_size: config.bulk_batch_size.max(1),
            retry: RetryConfig::new(config.bulk_max_retries),
        })
    }

    /// Replace the bulk retry schedule.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Name of the managed index.
    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Make newly written documents visible to search.
    pub async fn refresh(&self) -> Result<(), IndexError> {
        let response = self
            .send(self.request(Method::POST, &format!("{}/_refresh", self.index)))
            .await?;
        if response.status().is_success() {
            tracing::debug!(index = %self.index, "Index refreshed");
            Ok(())
        } else {
            Err(unexpected(response).await)
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some((user, password)) = &self.credentials {
            req = req.basic_auth(user, password.as_deref());
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, IndexError> {
        req.send().await.map_err(|error| {
            if error.is_connect() {
                IndexError::Unreachable(self.base_url.clone())
            } else {
                IndexError::Http(error)
            }
        })
    }

    async fn index_exists(&self) -> Result<bool, IndexError> {
        let response = self.send(self.request(Method::HEAD, &self.index)).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                let error = unexpected(response).await;
                tracing::error!(index = %self.index, error = %error, "Index existence check failed");
                Err(error)
            }
        }
    }

    async fn create_index(&self) -> Result<(), IndexError> {
        let response = self
            .send(
                self.request(Method::PUT, &self.index)
                    .json(&index_body(self.dimension)),
            )
            .await?;

        if response.status().is_success() {
            tracing::info!(
                index = %self.index,
                dimension = self.dimension,
                "Created index"
            );
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.contains(ALREADY_EXISTS) {
            tracing::debug!(index = %self.index, "Index created concurrently");
            return Ok(());
        }
        let error = IndexError::UnexpectedStatus { status, body };
        tracing::error!(index = %self.index, error = %error, "Failed to create index");
        Err(error)
    }

    async fn write_batch(&self, body: &str) -> Result<usize, BulkAttemptError> {
        let response = self
            .request(Method::POST, "_bulk")
            .header("content-type", "application/x-ndjson")
            .body(body.to_owned())
            .send()
            .await
            .map_err(|error| BulkAttemptError {
                transient: error.is_connect() || error.is_timeout(),
                reason: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkAttemptError {
                transient: is_transient_status(status.as_u16()),
                reason: format!("status {status}: {body}"),
            });
        }

        let parsed: BulkResponse = response.json().await.map_err(|error| BulkAttemptError {
            transient: false,
            reason: format!("malformed bulk response: {error}"),
        })?;

        let statuses: Vec<u16> = parsed.item_statuses().collect();
        if parsed.errors {
            let failed: Vec<u16> = statuses
                .iter()
                .copied()
                .filter(|status| *status >= 300)
                .collect();
            if !failed.is_empty() {
                return Err(BulkAttemptError {
                    transient: failed.iter().all(|status| is_transient_item(*status)),
                    reason: format!(
                        "{} item(s) failed: {}",
                        failed.len(),
                        parsed.first_error().unwrap_or_default()
                    ),
                });
            }
        }

        Ok(statuses.len())
    }
}

#[async_trait]
impl VectorStore for OpenSearchStore {
    async fn probe(&self) -> bool {
        match self.request(Method::GET, "").send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "OpenSearch probe rejected");
                false
            }
            Err(error) => {
                tracing::warn!(url = %self.base_url, error = %error, "OpenSearch probe failed");
                false
            }
        }
    }

    async fn ensure_index(&self) -> Result<(), IndexError> {
        if self.index_exists().await? {
            return Ok(());
        }
        self.create_index().await
    }

    async fn bulk_upsert(
        &self,
        chunks: &[Chunk],
        embeddings: &EmbeddingMap,
    ) -> Result<BulkOutcome, IndexError> {
        let mut outcome = BulkOutcome::default();
        let mut documents = Vec::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter().enumerate() {
            match embeddings.get(&idx).and_then(Option::as_ref) {
                Some(vector) => documents.push(IndexDocument {
                    chunk,
                    embedding_vector: vector,
                }),
                None => {
                    outcome.skipped += 1;
                    tracing::warn!(
                        chunk_id = %chunk.id,
                        filename = %chunk.filename,
                        position = chunk.position,
                        "Skipping chunk without embedding"
                    );
                }
            }
        }

        if documents.is_empty() {
            return Ok(outcome);
        }

        for batch in documents.chunks(self.batch_size) {
            let body = bulk_body(&self.index, batch)
                .map_err(|error| IndexError::BulkWriteFailure {
                    attempts: 0,
                    reason: format!("failed to serialize documents: {error}"),
                })?;

            match with_retry(&self.retry, || self.write_batch(&body)).await {
                RetryResult::Success(written) => {
                    outcome.written += written;
                    tracing::debug!(index = %self.index, documents = written, "Bulk batch written");
                }
                RetryResult::Failed {
                    last_error,
                    attempts,
                } => {
                    tracing::error!(
                        index = %self.index,
                        attempts,
                        error = %last_error,
                        "Bulk batch failed"
                    );
                    return Err(IndexError::BulkWriteFailure {
                        attempts,
                        reason: last_error.reason,
                    });
                }
            }
        }

        self.refresh().await?;
        Ok(outcome)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let mut knn = json!({
            "vector": vector,
            "k": k,
        });
        if let (Some(filter), Some(object)) = (filter, knn.as_object_mut()) {
            object.insert("filter".into(), filter);
        }
        let body = json!({
            "size": k,
            "query": { "knn": { "embedding_vector": knn } },
            "_source": { "excludes": ["embedding_vector"] },
        });

        let response = self
            .send(
                self.request(Method::POST, &format!("{}/_search", self.index))
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            let error = unexpected(response).await;
            tracing::error!(index = %self.index, error = %error, "OpenSearch search failed");
            return Err(error);
        }

        let payload: SearchResponse = response.json().await?;
        Ok(payload
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score.unwrap_or_default(),
                source: hit.source,
            })
            .collect())
    }
}

#[derive(Debug)]
struct BulkAttemptError {
    transient: bool,
    reason: String,
}

impl std::fmt::Display for BulkAttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

impl Retryable for BulkAttemptError {
    fn is_retryable(&self) -> bool {
        self.transient
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

fn is_transient_item(status: u16) -> bool {
    status == 429 || status >= 500
}

fn bulk_body(index: &str, documents: &[IndexDocument<'_>]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for document in documents {
        let action = json!({ "index": { "_index": index, "_id": document.chunk.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

async fn unexpected(response: reqwest::Response) -> IndexError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    IndexError::UnexpectedStatus { status, body }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkType;
    use crate::config::test_config;
    use httpmock::{
        Method::{GET, HEAD, POST, PUT},
        MockServer,
    };

    fn store(server: &MockServer) -> OpenSearchStore {
        OpenSearchStore::new(&test_config(&server.base_url()))
            .expect("store")
            .with_retry_config(RetryConfig::new(3).with_initial_delay(Duration::from_millis(1)))
    }

    fn chunk(position: usize) -> Chunk {
        Chunk {
            id: format!("doc-{position}"),
            content: format!("chunk {position}"),
            filename: "report.pdf".into(),
            position,
            tokens: Some(2),
            section_title: String::new(),
            chunk_type: ChunkType::Text,
            content_json: None,
            heading_level: None,
        }
    }

    fn bulk_ok(count: usize) -> Value {
        let items: Vec<Value> = (0..count)
            .map(|idx| json!({"index": {"_id": format!("doc-{idx}"), "status": 201}}))
            .collect();
        json!({"took": 3, "errors": false, "items": items})
    }

    #[tokio::test]
    async fn probe_reports_reachability() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).json_body(json!({"version": {"number": "2.11.0"}}));
            })
            .await;
        assert!(store(&server).probe().await);

        let unreachable = OpenSearchStore::new(&test_config("http://127.0.0.1:1")).unwrap();
        assert!(!unreachable.probe().await);
    }

    #[tokio::test]
    async fn ensure_index_creates_missing_index() {
        let server = MockServer::start_async().await;
        let head = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/semantic_chunks");
                then.status(404);
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/semantic_chunks")
                    .json_body_partial(r#"{"settings": {"index": {"knn": true}}}"#);
                then.status(200).json_body(json!({"acknowledged": true}));
            })
            .await;

        store(&server).ensure_index().await.expect("created");
        head.assert();
        put.assert();
    }

    #[tokio::test]
    async fn ensure_index_twice_leaves_existing_mapping_alone() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/semantic_chunks");
                then.status(200);
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/semantic_chunks");
                then.status(200);
            })
            .await;

        let store = store(&server);
        store.ensure_index().await.expect("first");
        store.ensure_index().await.expect("second");
        put.assert_hits(0);
    }

    #[tokio::test]
    async fn concurrent_creation_counts_as_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/semantic_chunks");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/semantic_chunks");
                then.status(400).json_body(json!({
                    "error": {"type": "resource_already_exists_exception"},
                    "status": 400
                }));
            })
            .await;

        store(&server).ensure_index().await.expect("already exists");
    }

    #[tokio::test]
    async fn bulk_upsert_skips_chunks_without_embeddings() {
        let server = MockServer::start_async().await;
        let bulk = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/_bulk")
                    .body_contains(r#""_id":"doc-0""#)
                    .body_contains(r#""embedding_vector":[0.5,0.5]"#);
                then.status(200).json_body(bulk_ok(4));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/semantic_chunks/_refresh");
                then.status(200).json_body(json!({"_shards": {"successful": 3}}));
            })
            .await;

        let chunks: Vec<Chunk> = (0..5).map(chunk).collect();
        let embeddings: EmbeddingMap = (0..5)
            .map(|idx| (idx, (idx != 2).then(|| vec![0.5, 0.5])))
            .collect();

        let outcome = store(&server)
            .bulk_upsert(&chunks, &embeddings)
            .await
            .expect("bulk");

        bulk.assert();
        refresh.assert();
        assert_eq!(outcome, BulkOutcome { written: 4, skipped: 1 });
    }

    #[tokio::test]
    async fn bulk_upsert_splits_batches() {
        let server = MockServer::start_async().await;
        let bulk = server
            .mock_async(|when, then| {
                when.method(POST).path("/_bulk");
                then.status(200).json_body(bulk_ok(2));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/semantic_chunks/_refresh");
                then.status(200);
            })
            .await;

        let mut store = store(&server);
        store.batch_size = 2;
        let chunks: Vec<Chunk> = (0..4).map(chunk).collect();
        let embeddings: EmbeddingMap = (0..4).map(|idx| (idx, Some(vec![1.0]))).collect();

        let outcome = store.bulk_upsert(&chunks, &embeddings).await.unwrap();
        bulk.assert_hits(2);
        assert_eq!(outcome.written, 4);
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_exhausted() {
        let server = MockServer::start_async().await;
        let bulk = server
            .mock_async(|when, then| {
                when.method(POST).path("/_bulk");
                then.status(503).body("overloaded");
            })
            .await;

        let chunks = vec![chunk(0)];
        let embeddings: EmbeddingMap = [(0, Some(vec![1.0]))].into_iter().collect();
        let error = store(&server)
            .bulk_upsert(&chunks, &embeddings)
            .await
            .expect_err("exhausted");

        bulk.assert_hits(3);
        assert!(matches!(error, IndexError::BulkWriteFailure { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn item_level_throttling_is_retried() {
        let server = MockServer::start_async().await;
        let bulk = server
            .mock_async(|when, then| {
                when.method(POST).path("/_bulk");
                then.status(200).json_body(json!({
                    "errors": true,
                    "items": [{"index": {"_id": "doc-0", "status": 429,
                        "error": {"type": "es_rejected_execution_exception"}}}]
                }));
            })
            .await;

        let chunks = vec![chunk(0)];
        let embeddings: EmbeddingMap = [(0, Some(vec![1.0]))].into_iter().collect();
        let error = store(&server)
            .bulk_upsert(&chunks, &embeddings)
            .await
            .expect_err("throttled");

        bulk.assert_hits(3);
        assert!(
            matches!(error, IndexError::BulkWriteFailure { ref reason, .. } if reason.contains("es_rejected_execution_exception"))
        );
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let server = MockServer::start_async().await;
        let bulk = server
            .mock_async(|when, then| {
                when.method(POST).path("/_bulk");
                then.status(400).body("mapper_parsing_exception");
            })
            .await;

        let chunks = vec![chunk(0)];
        let embeddings: EmbeddingMap = [(0, Some(vec![1.0]))].into_iter().collect();
        let error = store(&server)
            .bulk_upsert(&chunks, &embeddings)
            .await
            .expect_err("rejected");

        bulk.assert_hits(1);
        assert!(matches!(error, IndexError::BulkWriteFailure { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn search_excludes_vectors_and_maps_hits() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/semantic_chunks/_search")
                    .json_body_partial(r#"{"_source": {"excludes": ["embedding_vector"]}}"#);
                then.status(200).json_body(json!({
                    "hits": {"hits": [
                        {"_id": "doc-1", "_score": 0.87, "_source": {"content": "Quarterly totals"}}
                    ]}
                }));
            })
            .await;

        let hits = store(&server)
            .search(&[0.1, 0.2], 3, None)
            .await
            .expect("search");

        mock.assert();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "doc-1");
        assert_eq!(hits[0].content(), Some("Quarterly totals"));
        assert!((hits[0].score - 0.87).abs() < f32::EPSILON);
    }
}
