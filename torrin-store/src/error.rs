use thiserror::Error;

use torrin_core::UploadId;

/// Errors from upload store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(UploadId),

    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
