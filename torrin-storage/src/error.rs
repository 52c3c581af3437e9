use thiserror::Error;

use torrin_core::{UploadError, UploadId};

/// Errors from storage driver operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The number of bytes written differs from the expected chunk size.
    #[error("chunk size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The supplied chunk hash did not match the streamed bytes.
    #[error("chunk hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The driver has no state for this upload (e.g. a multipart upload
    /// initiated in another process).
    #[error("no storage state for upload: {0}")]
    NotInitialized(UploadId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SizeMismatch { expected, actual } => {
                UploadError::ChunkSizeMismatch { expected, actual }
            }
            StorageError::HashMismatch { expected, actual } => {
                UploadError::ChunkHashMismatch { expected, actual }
            }
            other => UploadError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mismatch_maps_to_chunk_size_mismatch() {
        let err: UploadError = StorageError::SizeMismatch {
            expected: 10,
            actual: 5,
        }
        .into();
        assert_eq!(err.code(), "CHUNK_SIZE_MISMATCH");
    }

    #[test]
    fn backend_errors_map_to_storage_error() {
        let err: UploadError = StorageError::Backend("bucket gone".into()).into();
        assert_eq!(err.code(), "STORAGE_ERROR");

        let err: UploadError =
            StorageError::NotInitialized(UploadId::from("u_other_process")).into();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }
}
