use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use torrin_core::{
    layout, CompleteResult, SessionUpdate, UploadError, UploadId, UploadInit, UploadSession,
    UploadStatus, UploadStatusReport,
};
use torrin_storage::{ByteStream, StorageDriver};
use torrin_store::{StoreError, UploadStore};

use crate::metrics::ServiceMetrics;

/// Tunables for the upload service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Chunk size used when the client expresses no preference.
    pub default_chunk_size: u64,
    /// TTL applied to new sessions. `None` disables expiry.
    pub session_ttl: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: layout::DEFAULT_CHUNK_SIZE,
            session_ttl: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

/// One incoming chunk, headers plus body.
pub struct ChunkUpload {
    pub upload_id: UploadId,
    pub index: u32,
    /// Declared body length; must equal the expected chunk size.
    pub size: u64,
    /// Optional hex SHA-256 of the body.
    pub hash: Option<String>,
    pub body: ByteStream,
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub cleaned: usize,
    pub errors: Vec<String>,
}

/// The upload coordination service.
///
/// Validates inputs, sequences store and driver calls, enforces the session
/// state machine, and surfaces the typed error taxonomy. The service is
/// reentrant: operations on distinct sessions run concurrently, and
/// consistency for a single session comes from the store and driver
/// contracts rather than service-side locking.
pub struct UploadService {
    pub(crate) store: Arc<dyn UploadStore>,
    pub(crate) driver: Arc<dyn StorageDriver>,
    pub(crate) config: ServiceConfig,
    pub(crate) metrics: Arc<ServiceMetrics>,
}

impl std::fmt::Debug for UploadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UploadService {
    /// Service metrics counters.
    #[must_use]
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Create a new session and prepare driver-side storage for it.
    ///
    /// Both the store record and the driver state must be created for the
    /// session to exist; if the driver fails, the store record is removed
    /// again on a best-effort basis.
    #[instrument(skip(self, init), fields(file_size = init.file_size))]
    pub async fn init_upload(&self, init: UploadInit) -> Result<UploadSession, UploadError> {
        if init.file_size == 0 {
            return Err(UploadError::InvalidRequest(
                "fileSize must be positive".to_owned(),
            ));
        }

        let desired = init.desired_chunk_size.unwrap_or(self.config.default_chunk_size);
        let chunk_size = layout::normalize_chunk_size(Some(desired), init.file_size);
        let chunk_layout = layout::ChunkLayout::new(init.file_size, chunk_size);

        let upload_id = UploadId::generate();
        let session = self
            .store
            .create_session(
                upload_id.clone(),
                init,
                chunk_size,
                chunk_layout.total_chunks,
                self.config.session_ttl,
            )
            .await
            .map_err(store_error)?;

        if let Err(e) = self.driver.init_upload(&session).await {
            warn!(upload_id = %upload_id, error = %e, "driver init failed, dropping session");
            if let Err(del) = self.store.delete_session(&upload_id).await {
                warn!(upload_id = %upload_id, error = %del, "orphan session cleanup failed");
            }
            return Err(e.into());
        }

        self.metrics.record_session_created();
        info!(
            upload_id = %session.upload_id,
            total_chunks = session.total_chunks,
            chunk_size = session.chunk_size,
            "upload session created"
        );
        Ok(session)
    }

    /// Validate and persist one chunk.
    ///
    /// Writing the same index twice is idempotent: the received-set has set
    /// semantics and the driver overwrites (last writer wins).
    #[instrument(skip(self, chunk), fields(upload_id = %chunk.upload_id, index = chunk.index))]
    pub async fn handle_chunk(&self, chunk: ChunkUpload) -> Result<(), UploadError> {
        let session = self.require_session(&chunk.upload_id).await?;
        match session.status {
            UploadStatus::Completed => {
                return Err(UploadError::AlreadyCompleted(chunk.upload_id))
            }
            UploadStatus::Canceled => return Err(UploadError::Canceled(chunk.upload_id)),
            _ => {}
        }

        let chunk_layout = session.layout();
        if !chunk_layout.contains(chunk.index) {
            return Err(UploadError::ChunkOutOfRange {
                index: chunk.index,
                total_chunks: session.total_chunks,
            });
        }

        let expected = chunk_layout.expected_size(chunk.index);
        if chunk.size != expected {
            return Err(UploadError::ChunkSizeMismatch {
                expected,
                actual: chunk.size,
            });
        }

        self.driver
            .write_chunk(
                &session,
                chunk.index,
                chunk.body,
                expected,
                chunk.hash.as_deref(),
            )
            .await?;

        self.store
            .mark_chunk_received(&chunk.upload_id, chunk.index)
            .await
            .map_err(store_error)?;

        if session.status == UploadStatus::Pending {
            self.store
                .update_session(
                    &chunk.upload_id,
                    SessionUpdate::status(UploadStatus::InProgress),
                )
                .await
                .map_err(store_error)?;
        }

        self.metrics.record_chunk(expected);
        Ok(())
    }

    /// Current session state plus its received/missing chunk indices.
    pub async fn get_status(
        &self,
        upload_id: &UploadId,
    ) -> Result<UploadStatusReport, UploadError> {
        let session = self.require_session(upload_id).await?;
        let received = self
            .store
            .list_received_chunks(upload_id)
            .await
            .map_err(store_error)?;
        let missing = session.layout().missing_chunks(&received);
        Ok(UploadStatusReport {
            upload_id: session.upload_id,
            status: session.status,
            file_name: session.file_name,
            file_size: session.file_size,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks,
            received_chunks: received,
            missing_chunks: missing,
        })
    }

    /// Assemble the final artifact once every chunk has arrived.
    ///
    /// Finalize and the status patch are not transactional: if the driver
    /// succeeds but the store patch fails, the artifact exists while the
    /// session stays `in_progress`. The service does not retry finalize
    /// (S3 multipart completion is not idempotent); the store error is
    /// surfaced to the caller.
    #[instrument(skip(self, _hash), fields(upload_id = %upload_id))]
    pub async fn complete_upload(
        &self,
        upload_id: &UploadId,
        _hash: Option<String>,
    ) -> Result<CompleteResult, UploadError> {
        let session = self.require_session(upload_id).await?;
        match session.status {
            UploadStatus::Completed => {
                return Err(UploadError::AlreadyCompleted(upload_id.clone()))
            }
            UploadStatus::Canceled => return Err(UploadError::Canceled(upload_id.clone())),
            _ => {}
        }

        let received = self
            .store
            .list_received_chunks(upload_id)
            .await
            .map_err(store_error)?;
        let missing = session.layout().missing_chunks(&received);
        if !missing.is_empty() {
            return Err(UploadError::MissingChunks(missing));
        }

        let location = self.driver.finalize_upload(&session).await?;

        self.store
            .update_session(upload_id, SessionUpdate::status(UploadStatus::Completed))
            .await
            .map_err(store_error)?;

        self.metrics.record_completed();
        info!(upload_id = %upload_id, "upload completed");
        Ok(CompleteResult {
            upload_id: upload_id.clone(),
            status: UploadStatus::Completed,
            file_size: session.file_size,
            location,
        })
    }

    /// Cancel the session and discard staged storage.
    ///
    /// Aborting an already-canceled session is a no-op.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn abort_upload(&self, upload_id: &UploadId) -> Result<(), UploadError> {
        let session = self.require_session(upload_id).await?;
        match session.status {
            UploadStatus::Completed => {
                return Err(UploadError::AlreadyCompleted(upload_id.clone()))
            }
            UploadStatus::Canceled => return Ok(()),
            _ => {}
        }

        self.driver.abort_upload(&session).await?;
        self.store
            .update_session(upload_id, SessionUpdate::status(UploadStatus::Canceled))
            .await
            .map_err(store_error)?;

        self.metrics.record_canceled();
        info!(upload_id = %upload_id, "upload canceled");
        Ok(())
    }

    /// Sweep sessions whose TTL deadline has passed.
    ///
    /// Requires the store's `list_expired_sessions` capability; without it
    /// the report carries a single "not supported" error. For every expired
    /// non-completed session the driver is aborted before the record is
    /// deleted; per-session errors are collected without stopping the sweep.
    pub async fn cleanup_expired_uploads(&self) -> CleanupReport {
        let sessions = match self.store.list_expired_sessions().await {
            Ok(sessions) => sessions,
            Err(StoreError::Unsupported(_)) => {
                return CleanupReport {
                    cleaned: 0,
                    errors: vec!["not supported".to_owned()],
                }
            }
            Err(e) => {
                return CleanupReport {
                    cleaned: 0,
                    errors: vec![e.to_string()],
                }
            }
        };
        self.sweep(sessions).await
    }

    /// Sweep sessions idle longer than `max_age`, regardless of TTL.
    ///
    /// Requires the store's `list_all_sessions` capability. A session is
    /// stale iff `now - updated_at > max_age` and it is not completed.
    pub async fn cleanup_stale_uploads(&self, max_age: Duration) -> CleanupReport {
        let sessions = match self.store.list_all_sessions().await {
            Ok(sessions) => sessions,
            Err(StoreError::Unsupported(_)) => {
                return CleanupReport {
                    cleaned: 0,
                    errors: vec!["not supported".to_owned()],
                }
            }
            Err(e) => {
                return CleanupReport {
                    cleaned: 0,
                    errors: vec![e.to_string()],
                }
            }
        };

        let cutoff = match chrono::Duration::from_std(max_age) {
            Ok(age) => Utc::now() - age,
            Err(_) => return CleanupReport::default(),
        };
        let stale = sessions
            .into_iter()
            .filter(|s| s.status != UploadStatus::Completed && s.updated_at < cutoff)
            .collect();
        self.sweep(stale).await
    }

    async fn sweep(&self, sessions: Vec<UploadSession>) -> CleanupReport {
        let mut report = CleanupReport::default();
        for session in sessions {
            if session.status != UploadStatus::Completed {
                if let Err(e) = self.driver.abort_upload(&session).await {
                    report
                        .errors
                        .push(format!("{}: {e}", session.upload_id));
                    continue;
                }
            }
            match self.store.delete_session(&session.upload_id).await {
                Ok(()) => report.cleaned += 1,
                Err(e) => report
                    .errors
                    .push(format!("{}: {e}", session.upload_id)),
            }
        }
        self.metrics.record_cleaned(report.cleaned as u64);
        if report.cleaned > 0 || !report.errors.is_empty() {
            info!(
                cleaned = report.cleaned,
                errors = report.errors.len(),
                "cleanup sweep finished"
            );
        }
        report
    }

    async fn require_session(&self, upload_id: &UploadId) -> Result<UploadSession, UploadError> {
        self.store
            .get_session(upload_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| UploadError::NotFound(upload_id.clone()))
    }
}

/// Fold store failures into the wire taxonomy.
fn store_error(err: StoreError) -> UploadError {
    match err {
        StoreError::NotFound(id) => UploadError::NotFound(id),
        other => UploadError::Internal(other.to_string()),
    }
}
