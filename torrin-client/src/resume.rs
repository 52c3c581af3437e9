//! Client-side persistence of upload state for resume.
//!
//! A resume store keeps one [`ClientUploadState`] per upload id plus a
//! file-key index mapping a stable fingerprint to the last upload id seen
//! for that file. Two implementations ship: a process-local map and a
//! JSON-file store laid out as `torrin_upload_<uploadId>.json` files plus a
//! `torrin_file_index.json` map.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use torrin_core::UploadId;

/// Everything the client needs to resume an upload later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUploadState {
    pub upload_id: UploadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Indices known uploaded at the last save.
    pub received_chunks: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Key/value persistence for [`ClientUploadState`] and the file-key index.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Persist state under its upload id.
    async fn save_state(&self, state: &ClientUploadState) -> io::Result<()>;

    /// Load state by upload id.
    async fn load_state(&self, upload_id: &UploadId) -> io::Result<Option<ClientUploadState>>;

    /// Remove state by upload id.
    async fn delete_state(&self, upload_id: &UploadId) -> io::Result<()>;

    /// Point `file_key` at `upload_id` in the fingerprint index.
    async fn set_file_key(&self, file_key: &str, upload_id: &UploadId) -> io::Result<()>;

    /// Resolve a fingerprint to its saved state, if both the index entry
    /// and the state record still exist.
    async fn find_by_file(&self, file_key: &str) -> io::Result<Option<ClientUploadState>>;

    /// Drop a fingerprint from the index.
    async fn remove_file_key(&self, file_key: &str) -> io::Result<()>;
}

/// Process-local resume store. State dies with the process; useful for
/// tests and for callers that only want same-run resume.
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    states: DashMap<String, ClientUploadState>,
    file_index: DashMap<String, UploadId>,
}

impl MemoryResumeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn save_state(&self, state: &ClientUploadState) -> io::Result<()> {
        self.states
            .insert(state.upload_id.as_str().to_owned(), state.clone());
        Ok(())
    }

    async fn load_state(&self, upload_id: &UploadId) -> io::Result<Option<ClientUploadState>> {
        Ok(self.states.get(upload_id.as_str()).map(|s| s.clone()))
    }

    async fn delete_state(&self, upload_id: &UploadId) -> io::Result<()> {
        self.states.remove(upload_id.as_str());
        Ok(())
    }

    async fn set_file_key(&self, file_key: &str, upload_id: &UploadId) -> io::Result<()> {
        self.file_index
            .insert(file_key.to_owned(), upload_id.clone());
        Ok(())
    }

    async fn find_by_file(&self, file_key: &str) -> io::Result<Option<ClientUploadState>> {
        let Some(upload_id) = self.file_index.get(file_key).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.load_state(&upload_id).await
    }

    async fn remove_file_key(&self, file_key: &str) -> io::Result<()> {
        self.file_index.remove(file_key);
        Ok(())
    }
}

/// JSON-file resume store rooted at a state directory.
#[derive(Debug)]
pub struct FsResumeStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the index file.
    index_lock: Mutex<()>,
}

impl FsResumeStore {
    /// Create a store rooted at `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn state_path(&self, upload_id: &UploadId) -> PathBuf {
        self.dir.join(format!("torrin_upload_{upload_id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("torrin_file_index.json")
    }

    async fn read_index(&self) -> io::Result<serde_json::Map<String, serde_json::Value>> {
        match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(io::Error::other),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
            Err(e) => Err(e),
        }
    }

    async fn write_index(
        &self,
        index: &serde_json::Map<String, serde_json::Value>,
    ) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(index).map_err(io::Error::other)?;
        tokio::fs::write(self.index_path(), bytes).await
    }
}

#[async_trait]
impl ResumeStore for FsResumeStore {
    async fn save_state(&self, state: &ClientUploadState) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(state).map_err(io::Error::other)?;
        tokio::fs::write(self.state_path(&state.upload_id), bytes).await
    }

    async fn load_state(&self, upload_id: &UploadId) -> io::Result<Option<ClientUploadState>> {
        match tokio::fs::read(self.state_path(upload_id)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(io::Error::other),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_state(&self, upload_id: &UploadId) -> io::Result<()> {
        match tokio::fs::remove_file(self.state_path(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn set_file_key(&self, file_key: &str, upload_id: &UploadId) -> io::Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        index.insert(
            file_key.to_owned(),
            serde_json::Value::String(upload_id.as_str().to_owned()),
        );
        self.write_index(&index).await
    }

    async fn find_by_file(&self, file_key: &str) -> io::Result<Option<ClientUploadState>> {
        let upload_id = {
            let _guard = self.index_lock.lock().await;
            self.read_index()
                .await?
                .get(file_key)
                .and_then(|v| v.as_str())
                .map(UploadId::from)
        };
        match upload_id {
            Some(id) => self.load_state(&id).await,
            None => Ok(None),
        }
    }

    async fn remove_file_key(&self, file_key: &str) -> io::Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        if index.remove(file_key).is_some() {
            self.write_index(&index).await?;
        }
        Ok(())
    }
}
