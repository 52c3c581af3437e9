use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use torrin_core::{SessionUpdate, UploadId, UploadInit, UploadSession, UploadStatus};
use torrin_store::{StoreError, UploadStore};

/// A single entry: the session record plus its received-chunk index.
#[derive(Debug, Clone)]
struct Entry {
    session: UploadSession,
    received: BTreeSet<u32>,
}

/// In-memory [`UploadStore`] backed by a [`DashMap`].
///
/// Expired sessions are not evicted eagerly: reads pretend they are gone
/// while [`list_expired_sessions`](UploadStore::list_expired_sessions) still
/// returns them so a cleanup sweep can release their storage first. State
/// does not survive a process restart.
#[derive(Debug, Default)]
pub struct MemoryUploadStore {
    entries: DashMap<String, Entry>,
}

impl MemoryUploadStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn create_session(
        &self,
        upload_id: UploadId,
        init: UploadInit,
        chunk_size: u64,
        total_chunks: u32,
        ttl: Option<Duration>,
    ) -> Result<UploadSession, StoreError> {
        let now = Utc::now();
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok().map(|d| now + d));
        let session = UploadSession {
            upload_id: upload_id.clone(),
            file_name: init.file_name,
            mime_type: init.mime_type,
            metadata: init.metadata,
            file_size: init.file_size,
            chunk_size,
            total_chunks,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at,
        };
        self.entries.insert(
            upload_id.as_str().to_owned(),
            Entry {
                session: session.clone(),
                received: BTreeSet::new(),
            },
        );
        Ok(session)
    }

    async fn get_session(&self, upload_id: &UploadId) -> Result<Option<UploadSession>, StoreError> {
        match self.entries.get(upload_id.as_str()) {
            Some(entry) if !entry.session.is_expired(Utc::now()) => {
                Ok(Some(entry.session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_session(
        &self,
        upload_id: &UploadId,
        update: SessionUpdate,
    ) -> Result<UploadSession, StoreError> {
        let mut entry = self
            .entries
            .get_mut(upload_id.as_str())
            .ok_or_else(|| StoreError::NotFound(upload_id.clone()))?;
        if let Some(status) = update.status {
            entry.session.status = status;
        }
        entry.session.updated_at = Utc::now();
        Ok(entry.session.clone())
    }

    async fn mark_chunk_received(
        &self,
        upload_id: &UploadId,
        index: u32,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .entries
            .get_mut(upload_id.as_str())
            .ok_or_else(|| StoreError::NotFound(upload_id.clone()))?;
        entry.received.insert(index);
        entry.session.updated_at = Utc::now();
        Ok(())
    }

    async fn list_received_chunks(&self, upload_id: &UploadId) -> Result<Vec<u32>, StoreError> {
        let entry = self
            .entries
            .get(upload_id.as_str())
            .ok_or_else(|| StoreError::NotFound(upload_id.clone()))?;
        Ok(entry.received.iter().copied().collect())
    }

    async fn delete_session(&self, upload_id: &UploadId) -> Result<(), StoreError> {
        self.entries.remove(upload_id.as_str());
        Ok(())
    }

    async fn list_expired_sessions(&self) -> Result<Vec<UploadSession>, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| {
                entry.session.is_expired(now) && entry.session.status != UploadStatus::Completed
            })
            .map(|entry| entry.session.clone())
            .collect())
    }

    async fn list_all_sessions(&self) -> Result<Vec<UploadSession>, StoreError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.session.clone())
            .collect())
    }
}
