//! Upload protocol endpoints.

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;

use torrin_core::{UploadError, UploadId, UploadInit, UploadStatus};
use torrin_engine::ChunkUpload;

use crate::error::ApiError;

use super::schemas::{ChunkReceivedResponse, CompleteRequest};
use super::AppState;

/// Header carrying an optional hex SHA-256 of the chunk body.
pub const CHUNK_HASH_HEADER: &str = "x-torrin-chunk-hash";

fn parse_upload_id(raw: &str) -> Result<UploadId, ApiError> {
    if !UploadId::is_valid(raw) {
        return Err(UploadError::InvalidRequest(format!("malformed upload id: {raw}")).into());
    }
    Ok(UploadId::from(raw))
}

/// `POST /` -- create a new upload session.
#[utoipa::path(
    post,
    path = "/torrin/uploads",
    tag = "Uploads",
    summary = "Create upload session",
    description = "Creates a new upload session for a file of the given size and \
                   returns the session, including the normalized chunk size and \
                   total chunk count.",
    request_body = UploadInit,
    responses(
        (status = 201, description = "Session created", body = torrin_core::UploadSession),
        (status = 400, description = "Invalid request", body = torrin_core::ErrorBody),
    )
)]
pub async fn init_upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadInit>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(init) =
        payload.map_err(|e| UploadError::InvalidRequest(e.body_text()))?;
    let session = state.service.init_upload(init).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `PUT /{upload_id}/chunks/{index}` -- upload one chunk body.
#[utoipa::path(
    put,
    path = "/torrin/uploads/{upload_id}/chunks/{index}",
    tag = "Uploads",
    summary = "Upload a chunk",
    description = "Streams one chunk body. `Content-Length` is required and must \
                   equal the expected chunk size; chunks may arrive in any order \
                   and re-uploading an index is idempotent.",
    params(
        ("upload_id" = String, Path, description = "Upload session id"),
        ("index" = u32, Path, description = "Zero-based chunk index"),
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk accepted", body = ChunkReceivedResponse),
        (status = 400, description = "Bad index, size, or hash", body = torrin_core::ErrorBody),
        (status = 404, description = "Unknown upload", body = torrin_core::ErrorBody),
        (status = 409, description = "Session completed or canceled", body = torrin_core::ErrorBody),
    )
)]
pub async fn put_chunk(
    State(state): State<AppState>,
    Path((upload_id, index)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id)?;
    let index: u32 = index.parse().map_err(|_| {
        UploadError::InvalidRequest("chunk index must be a non-negative integer".to_owned())
    })?;

    let size: u64 = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            UploadError::InvalidRequest("Content-Length header is required".to_owned())
        })?;
    if size == 0 {
        return Err(UploadError::InvalidRequest("chunk body must not be empty".to_owned()).into());
    }

    let hash = headers
        .get(CHUNK_HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let stream = body
        .into_data_stream()
        .map(|result| result.map_err(std::io::Error::other))
        .boxed();

    state
        .service
        .handle_chunk(ChunkUpload {
            upload_id: upload_id.clone(),
            index,
            size,
            hash,
            body: stream,
        })
        .await?;

    Ok(Json(ChunkReceivedResponse {
        upload_id,
        received_index: index,
        status: UploadStatus::InProgress,
    }))
}

/// `GET /{upload_id}/status` -- session state and chunk bookkeeping.
#[utoipa::path(
    get,
    path = "/torrin/uploads/{upload_id}/status",
    tag = "Uploads",
    summary = "Upload status",
    description = "Returns the session state together with the sorted received \
                   and missing chunk index lists.",
    params(("upload_id" = String, Path, description = "Upload session id")),
    responses(
        (status = 200, description = "Current status", body = torrin_core::UploadStatusReport),
        (status = 404, description = "Unknown upload", body = torrin_core::ErrorBody),
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id)?;
    let report = state.service.get_status(&upload_id).await?;
    Ok(Json(report))
}

/// `POST /{upload_id}/complete` -- finalize the upload.
#[utoipa::path(
    post,
    path = "/torrin/uploads/{upload_id}/complete",
    tag = "Uploads",
    summary = "Complete upload",
    description = "Assembles the final artifact once every chunk has arrived and \
                   returns its storage location.",
    params(("upload_id" = String, Path, description = "Upload session id")),
    request_body(content = CompleteRequest),
    responses(
        (status = 200, description = "Upload finalized", body = torrin_core::CompleteResult),
        (status = 400, description = "Chunks missing", body = torrin_core::ErrorBody),
        (status = 404, description = "Unknown upload", body = torrin_core::ErrorBody),
        (status = 409, description = "Session completed or canceled", body = torrin_core::ErrorBody),
    )
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id)?;
    // The body is optional; an empty one means "no file hash".
    let hash = if body.is_empty() {
        None
    } else {
        let request: CompleteRequest = serde_json::from_slice(&body)
            .map_err(|e| UploadError::InvalidRequest(format!("invalid body: {e}")))?;
        request.hash
    };
    let result = state.service.complete_upload(&upload_id, hash).await?;
    Ok(Json(result))
}

/// `DELETE /{upload_id}` -- cancel the upload.
#[utoipa::path(
    delete,
    path = "/torrin/uploads/{upload_id}",
    tag = "Uploads",
    summary = "Cancel upload",
    description = "Cancels the session and discards staged storage. Idempotent \
                   against an already-canceled session; fails against a \
                   completed one.",
    params(("upload_id" = String, Path, description = "Upload session id")),
    responses(
        (status = 204, description = "Upload canceled"),
        (status = 404, description = "Unknown upload", body = torrin_core::ErrorBody),
        (status = 409, description = "Session already completed", body = torrin_core::ErrorBody),
    )
)]
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let upload_id = parse_upload_id(&upload_id)?;
    state.service.abort_upload(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
