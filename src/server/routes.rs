use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::error::Error;
use crate::pipeline::{Extractor, Indexer, QueryResult, Resolver};
use crate::storage::UploadCredentials;

/// Request-boundary failure: a stable kind, a user-facing message, and a
/// status. Unclassified errors are logged here once and leave the process as
/// a generic 500; internals never reach the wire.
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::IndexNotReady => StatusCode::CONFLICT,
            Error::Storage(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::MediaOpen(_)
            | Error::Encoding(_)
            | Error::IndexCorruption(_)
            | Error::Metadata(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &e {
            Error::Internal(inner) => {
                error!(error = %inner, "unclassified failure at request boundary");
                "an unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        Self {
            status,
            kind: e.kind(),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: String,
    pub total_chunks: usize,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
}

/// Object keys come straight from clients; only bare file names may reach
/// the filesystem.
fn sanitize_file_name(name: &str) -> Result<&str, ApiError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return Err(ApiError::bad_request(format!("invalid file name: {name:?}")));
    }
    Ok(name)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn get_signed_url(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadCredentials>, ApiError> {
    let file_name = sanitize_file_name(&request.file_name)?;
    let credentials = state.objects.presigned_upload(file_name).await?;
    info!(file_name, url = %credentials.url, "issued upload credentials");
    Ok(Json(credentials))
}

pub async fn process_video(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let file_name = sanitize_file_name(&request.file_name)?.to_string();

    // One build at a time; a concurrent request queues here instead of
    // interleaving with the in-flight one.
    let _build_permit = state.build_lock.lock().await;

    state.metadata.upsert_video(&file_name).await?;

    let local_path = state.config.data_dir.join(&file_name);
    if local_path.exists() {
        info!(file_name, "video already cached locally, skipping download");
    } else {
        state.objects.download(&file_name, &local_path).await?;
    }

    let url = state
        .objects
        .presigned_get(
            &file_name,
            Duration::from_secs(state.config.storage.url_ttl_secs),
        )
        .await?;

    let indexer = Indexer::new(
        Extractor::new(state.config.chunking.clone()),
        state.encoder.clone(),
        state.holder.clone(),
    );
    let process_timeout = Duration::from_secs(state.config.limits.process_timeout_secs);
    let result = tokio::time::timeout(
        process_timeout,
        tokio::task::spawn_blocking(move || indexer.index_video(&local_path)),
    )
    .await;

    let report = match result {
        Err(_) => {
            warn!(file_name, "processing timed out");
            state.metadata.mark_failed(&file_name).await?;
            return Err(Error::Timeout(process_timeout).into());
        }
        Ok(Err(join_error)) => {
            state.metadata.mark_failed(&file_name).await?;
            return Err(Error::Internal(anyhow::anyhow!("worker died: {}", join_error)).into());
        }
        Ok(Ok(Err(e))) => {
            warn!(file_name, error = %e, "processing failed");
            state.metadata.mark_failed(&file_name).await?;
            return Err(e.into());
        }
        Ok(Ok(Ok(report))) => report,
    };

    state
        .metadata
        .mark_indexed(&file_name, report.chunks_indexed as i64)
        .await?;

    Ok(Json(ProcessResponse {
        message: "video processed and indexed successfully".to_string(),
        total_chunks: report.chunks_indexed,
        url,
    }))
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<QueryResult>, ApiError> {
    if params.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let resolver = Resolver::new(
        state.encoder.clone(),
        state.holder.clone(),
        state.config.resolver.clone(),
    );
    let query = params.query.clone();
    let result = tokio::task::spawn_blocking(move || resolver.resolve(&query))
        .await
        .map_err(|e| Error::Internal(anyhow::anyhow!("worker died: {}", e)))??;

    Ok(Json(result))
}
