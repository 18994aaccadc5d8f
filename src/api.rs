//! HTTP surface for the ingestion pipeline.
//!
//! - `POST /documents/upload` – Multipart upload of one or more `files` fields, with an
//!   optional `?workers=N` pool width. Returns the per-file results and the aggregate summary.
//!   Responds 400 when no file is attached and 503 when the vector index is unreachable.
//! - `GET /health` – Report whether the vector index answers.
//! - `GET /metrics` – Observe ingestion counters.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::extraction::UploadedFile;
use crate::ingestion::{IngestionApi, IngestionError, UploadReport};
use crate::metrics::MetricsSnapshot;

const UPLOAD_FIELD: &str = "files";
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/documents/upload", post(upload_documents::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

#[derive(Deserialize)]
struct UploadParams {
    #[serde(default)]
    workers: Option<usize>,
}

/// Ingest every uploaded file and return the report.
async fn upload_documents<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadReport>, AppError>
where
    S: IngestionApi,
{
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Malformed multipart body: {error}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(format!("Failed to read {filename}: {error}")))?;
        files.push(UploadedFile::new(filename, content));
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No files provided".into()));
    }

    tracing::info!(
        files = files.len(),
        workers = ?params.workers,
        "Upload received"
    );
    let report = service.upload(files, params.workers).await?;
    Ok(Json(report))
}

#[derive(Serialize)]
struct HealthResponse {
    index_reachable: bool,
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: IngestionApi,
{
    Json(HealthResponse {
        index_reachable: service.index_reachable().await,
    })
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: IngestionApi,
{
    Json(service.metrics_snapshot())
}

enum AppError {
    BadRequest(String),
    Ingestion(IngestionError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Ingestion(error @ IngestionError::IndexUnreachable) => {
                (StatusCode::SERVICE_UNAVAILABLE, error.to_string())
            }
            AppError::Ingestion(error) => {
                tracing::error!(error = %error, "Upload failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IngestionError> for AppError {
    fn from(inner: IngestionError) -> Self {
        Self::Ingestion(inner)
    }
}
