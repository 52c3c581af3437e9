use std::time::Duration;

use async_trait::async_trait;

use torrin_core::{SessionUpdate, UploadId, UploadInit, UploadSession};

use crate::error::StoreError;

/// Trait for persisting upload sessions and their received-chunk indices.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// For a single upload id, `mark_chunk_received` and `list_received_chunks`
/// must be atomic with respect to each other.
///
/// The two listing operations are optional capabilities: stores that cannot
/// enumerate sessions keep the default implementations, and the service
/// reports cleanup as unsupported.
#[async_trait]
pub trait UploadStore: Send + Sync + std::fmt::Debug {
    /// Persist a new session built from `init` with the normalized geometry.
    ///
    /// The store owns the timestamps: `created_at` and `updated_at` are set
    /// to now, and `expires_at` to `created_at + ttl` when a TTL is given.
    async fn create_session(
        &self,
        upload_id: UploadId,
        init: UploadInit,
        chunk_size: u64,
        total_chunks: u32,
        ttl: Option<Duration>,
    ) -> Result<UploadSession, StoreError>;

    /// Fetch a session by id.
    ///
    /// Returns `None` for unknown ids and for sessions whose `expires_at`
    /// has passed (expired sessions stay in the store for cleanup but are
    /// invisible to reads).
    async fn get_session(&self, upload_id: &UploadId) -> Result<Option<UploadSession>, StoreError>;

    /// Apply a partial update and refresh `updated_at`.
    async fn update_session(
        &self,
        upload_id: &UploadId,
        update: SessionUpdate,
    ) -> Result<UploadSession, StoreError>;

    /// Record that chunk `index` has been persisted. Idempotent set insert;
    /// refreshes `updated_at`.
    async fn mark_chunk_received(&self, upload_id: &UploadId, index: u32)
        -> Result<(), StoreError>;

    /// All received chunk indices, ascending.
    async fn list_received_chunks(&self, upload_id: &UploadId) -> Result<Vec<u32>, StoreError>;

    /// Remove the session and its chunk index. Deleting a missing session
    /// is a no-op.
    async fn delete_session(&self, upload_id: &UploadId) -> Result<(), StoreError>;

    /// Sessions whose TTL deadline has passed, excluding `completed` ones.
    async fn list_expired_sessions(&self) -> Result<Vec<UploadSession>, StoreError> {
        Err(StoreError::Unsupported("list_expired_sessions"))
    }

    /// Every live session in the store.
    async fn list_all_sessions(&self) -> Result<Vec<UploadSession>, StoreError> {
        Err(StoreError::Unsupported("list_all_sessions"))
    }
}
