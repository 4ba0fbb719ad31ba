//! HTTP surface for docsift.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /process` – Multipart upload of one or more files. Each file is staged, its text
//!   extracted and structured, and the records are returned as a JSON array in upload order,
//!   each tagged with `fileName`. Any failing file fails the whole request with a `500` whose
//!   `detail` names that file.
//! - `GET /` and `GET /health` – Liveness probe.
//! - `GET /metrics` – Batch and erasure counters.
//!
//! The persisted output of a successful batch is cleared by the erase queue once the response
//! body has been handed to the transport.

use crate::config::Config;
use crate::pipeline::{PipelineApi, PipelineError, UploadedFile};
use crate::sink::ErasureTicket;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>, config: &Config) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/process", post(process_files::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(cors_layer(config))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(service)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match &config.allowed_origins {
        None => layer.allow_origin(Any),
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(parsed)
        }
    }
}

/// Response body for the liveness probe.
#[derive(Serialize)]
struct HealthResponse {
    message: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Server is running",
    })
}

/// Run every uploaded file through the pipeline and return the structured records.
///
/// Parts without a filename are ignored. On a malformed upload the rest of the multipart stream
/// is drained before answering so the client does not see a connection reset.
async fn process_files<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Response, AppError>
where
    S: PipelineApi,
{
    let files = match collect_uploads(&mut multipart).await {
        Ok(files) => files,
        Err(error) => {
            tracing::warn!(error = %error.detail(), "Upload rejected; draining request body");
            drain(&mut multipart).await;
            return Err(error);
        }
    };

    let batch = service.process_batch(files).await?;
    tracing::info!(records = batch.records.len(), "Process request completed");
    json_with_erasure(&batch.records, batch.erasure)
}

async fn collect_uploads(multipart: &mut Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            tracing::debug!(field = ?field.name(), "Skipping non-file form field");
            continue;
        };
        let content = field.bytes().await?;
        files.push(UploadedFile { file_name, content });
    }
    Ok(files)
}

async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

/// Serialize `body` and release `ticket` only after the bytes were taken by the transport.
///
/// If the connection drops first, the stream is dropped with the ticket inside it, which still
/// schedules the erasure.
fn json_with_erasure<T: Serialize>(body: &T, ticket: ErasureTicket) -> Result<Response, AppError> {
    let payload = Bytes::from(serde_json::to_vec(body).map_err(AppError::Encode)?);
    let stream = async_stream::stream! {
        yield Ok::<Bytes, std::io::Error>(payload);
        ticket.fire();
    };
    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    Upload { status: StatusCode, detail: String },
    Encode(serde_json::Error),
}

impl AppError {
    fn detail(&self) -> String {
        match self {
            Self::Pipeline(error) => error.to_string(),
            Self::Upload { detail, .. } => detail.clone(),
            Self::Encode(error) => format!("failed to encode response: {error}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Pipeline(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload { status, .. } => *status,
        };
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        Self::Upload {
            status: error.status(),
            detail: error.body_text(),
        }
    }
}
