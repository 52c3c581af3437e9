use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::UploadId;

/// Error taxonomy shared by the service, the HTTP surface, and the client.
///
/// Each variant maps to a stable wire code (see [`UploadError::code`]); the
/// HTTP layer derives the response status from the code and the client maps
/// parsed error bodies back into the same variants.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload not found: {0}")]
    NotFound(UploadId),

    #[error("upload already completed: {0}")]
    AlreadyCompleted(UploadId),

    #[error("upload canceled: {0}")]
    Canceled(UploadId),

    #[error("chunk index {index} out of range (total chunks: {total_chunks})")]
    ChunkOutOfRange { index: u32, total_chunks: u32 },

    #[error("chunk size mismatch: expected {expected} bytes, got {actual}")]
    ChunkSizeMismatch { expected: u64, actual: u64 },

    #[error("chunk hash mismatch: expected {expected}, got {actual}")]
    ChunkHashMismatch { expected: String, actual: String },

    /// Reserved for drivers that refuse duplicate indices; the reference
    /// drivers accept re-uploads idempotently and never raise this.
    #[error("chunk {index} already uploaded")]
    ChunkAlreadyUploaded { index: u32 },

    #[error("cannot complete upload: {} chunk(s) missing", .0.len())]
    MissingChunks(Vec<u32>),

    #[error("file hash mismatch: expected {expected}, got {actual}")]
    FileHashMismatch { expected: String, actual: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "UPLOAD_NOT_FOUND",
            Self::AlreadyCompleted(_) => "UPLOAD_ALREADY_COMPLETED",
            Self::Canceled(_) => "UPLOAD_CANCELED",
            Self::ChunkOutOfRange { .. } => "CHUNK_OUT_OF_RANGE",
            Self::ChunkSizeMismatch { .. } => "CHUNK_SIZE_MISMATCH",
            Self::ChunkHashMismatch { .. } => "CHUNK_HASH_MISMATCH",
            Self::ChunkAlreadyUploaded { .. } => "CHUNK_ALREADY_UPLOADED",
            Self::MissingChunks(_) => "MISSING_CHUNKS",
            Self::FileHashMismatch { .. } => "FILE_HASH_MISMATCH",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Timeout(_) => "TIMEOUT_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured detail payload carried alongside the code, if any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ChunkSizeMismatch { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            Self::ChunkHashMismatch { expected, actual }
            | Self::FileHashMismatch { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            Self::ChunkOutOfRange {
                index,
                total_chunks,
            } => Some(serde_json::json!({
                "index": index,
                "totalChunks": total_chunks,
            })),
            Self::MissingChunks(missing) => Some(serde_json::json!({
                "missingChunks": missing,
            })),
            _ => None,
        }
    }

    /// Reconstruct an error from a parsed wire body.
    ///
    /// Codes that carry structured details recover them where possible;
    /// unknown codes fold into [`UploadError::Internal`].
    #[must_use]
    pub fn from_wire(code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        let detail_u64 = |key: &str| {
            details
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(serde_json::Value::as_u64)
        };
        let detail_str = |key: &str| {
            details
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        match code {
            "UPLOAD_NOT_FOUND" => Self::NotFound(UploadId::from(message)),
            "UPLOAD_ALREADY_COMPLETED" => Self::AlreadyCompleted(UploadId::from(message)),
            "UPLOAD_CANCELED" => Self::Canceled(UploadId::from(message)),
            "CHUNK_OUT_OF_RANGE" => Self::ChunkOutOfRange {
                index: detail_u64("index").unwrap_or_default() as u32,
                total_chunks: detail_u64("totalChunks").unwrap_or_default() as u32,
            },
            "CHUNK_SIZE_MISMATCH" => Self::ChunkSizeMismatch {
                expected: detail_u64("expected").unwrap_or_default(),
                actual: detail_u64("actual").unwrap_or_default(),
            },
            "CHUNK_HASH_MISMATCH" => Self::ChunkHashMismatch {
                expected: detail_str("expected").unwrap_or_default(),
                actual: detail_str("actual").unwrap_or_default(),
            },
            "CHUNK_ALREADY_UPLOADED" => Self::ChunkAlreadyUploaded {
                index: detail_u64("index").unwrap_or_default() as u32,
            },
            "MISSING_CHUNKS" => {
                let missing = details
                    .as_ref()
                    .and_then(|d| d.get("missingChunks"))
                    .and_then(serde_json::Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(serde_json::Value::as_u64)
                            .map(|v| v as u32)
                            .collect()
                    })
                    .unwrap_or_default();
                Self::MissingChunks(missing)
            }
            "FILE_HASH_MISMATCH" => Self::FileHashMismatch {
                expected: detail_str("expected").unwrap_or_default(),
                actual: detail_str("actual").unwrap_or_default(),
            },
            "STORAGE_ERROR" => Self::Storage(message),
            "INVALID_REQUEST" => Self::InvalidRequest(message),
            "NETWORK_ERROR" => Self::Network(message),
            "TIMEOUT_ERROR" => Self::Timeout(std::time::Duration::ZERO),
            _ => Self::Internal(message),
        }
    }
}

/// Wire shape of an error response: `{"error": {"code", "message", "details"?}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Code, message, and optional structured details of one error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&UploadError> for ErrorBody {
    fn from(err: &UploadError) -> Self {
        Self {
            error: ErrorDetail {
                code: err.code().to_owned(),
                message: err.to_string(),
                details: err.details(),
            },
        }
    }
}
