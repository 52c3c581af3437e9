//! Error types for the Torrin client.

use thiserror::Error;

use torrin_core::UploadError;

/// Errors that can occur when using the Torrin client.
#[derive(Debug, Error)]
pub enum Error {
    /// A protocol error, either returned by the server or raised locally
    /// (cancellation surfaces as [`UploadError::Canceled`]).
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Reading the upload source or the resume store failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Client configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// The wire code for this error, where one applies.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Upload(err) => Some(err.code()),
            _ => None,
        }
    }

    /// Returns `true` if this error was caused by cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Upload(UploadError::Canceled(_)))
    }

    /// Returns `true` if retrying the operation could help.
    ///
    /// The chunk pump retries uniformly regardless of this classification;
    /// it is exposed for callers that want to be more selective.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload(err) => matches!(
                err,
                UploadError::Network(_)
                    | UploadError::Timeout(_)
                    | UploadError::Storage(_)
                    | UploadError::Internal(_)
            ),
            Self::Io(_) => false,
            Self::Configuration(_) => false,
        }
    }
}
