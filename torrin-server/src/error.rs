use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use torrin_core::{ErrorBody, UploadError};

/// Errors that can occur while setting up or running the Torrin server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The upload service could not be assembled.
    #[error(transparent)]
    Build(#[from] torrin_engine::BuildError),
}

/// Wrapper rendering an [`UploadError`] as the wire error body with the
/// status derived from its code.
#[derive(Debug)]
pub struct ApiError(pub UploadError);

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        Self(err)
    }
}

/// HTTP status implied by an error code.
fn status_for(err: &UploadError) -> StatusCode {
    match err {
        UploadError::NotFound(_) => StatusCode::NOT_FOUND,
        UploadError::AlreadyCompleted(_)
        | UploadError::Canceled(_)
        | UploadError::ChunkAlreadyUploaded { .. } => StatusCode::CONFLICT,
        UploadError::ChunkOutOfRange { .. }
        | UploadError::ChunkSizeMismatch { .. }
        | UploadError::ChunkHashMismatch { .. }
        | UploadError::MissingChunks(_)
        | UploadError::FileHashMismatch { .. }
        | UploadError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        UploadError::Network(_) | UploadError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        UploadError::Storage(_) | UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}
