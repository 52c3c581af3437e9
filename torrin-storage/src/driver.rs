use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use torrin_core::{StorageLocation, UploadSession};

use crate::error::StorageError;

/// A chunk body as it arrives off the wire.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Wrap an in-memory buffer as a [`ByteStream`].
///
/// Mostly useful in tests and in drivers that re-emit buffered bodies.
#[must_use]
pub fn stream_from_bytes(bytes: Bytes) -> ByteStream {
    futures::stream::once(async move { Ok(bytes) }).boxed()
}

/// Pluggable byte persistence for upload sessions.
///
/// Implementors provide the actual storage mechanism; the engine ships a
/// local-filesystem driver and an S3 multipart driver. Drivers must
/// tolerate concurrent `write_chunk` calls for distinct indices of the same
/// session, and overwrite on a repeated index (last writer wins).
#[async_trait]
pub trait StorageDriver: Send + Sync + std::fmt::Debug {
    /// Prepare per-upload storage state (staging directory, multipart
    /// upload, ...). Called once by the service after the session record
    /// exists.
    async fn init_upload(&self, session: &UploadSession) -> Result<(), StorageError>;

    /// Persist the body of chunk `index`.
    ///
    /// The driver must verify that exactly `expected_size` bytes arrived
    /// and fail with [`StorageError::SizeMismatch`] otherwise, discarding
    /// any partial write. `hash` is an optional hex SHA-256 of the body;
    /// drivers may verify it or treat it as advisory.
    async fn write_chunk(
        &self,
        session: &UploadSession,
        index: u32,
        body: ByteStream,
        expected_size: u64,
        hash: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Assemble the accumulated chunks into the final artifact and release
    /// staging state. Not idempotent; the service calls it at most once per
    /// session.
    async fn finalize_upload(&self, session: &UploadSession)
        -> Result<StorageLocation, StorageError>;

    /// Discard all staged state for the session. Absent state is success.
    async fn abort_upload(&self, session: &UploadSession) -> Result<(), StorageError>;
}
