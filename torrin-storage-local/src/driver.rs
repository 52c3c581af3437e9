use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};

use torrin_core::{StorageLocation, UploadSession};
use torrin_storage::{ByteStream, StorageDriver, StorageError};

/// Storage driver that stages chunks as numbered files under a temp
/// directory and concatenates them into the final artifact on finalize.
///
/// Layout: chunks at `<temp_dir>/<upload_id>/chunk_<6-digit-index>`; the
/// final artifact at `<base_dir>/<upload_id><ext>`, or
/// `<base_dir>/<upload_id>/<file_name>` when file names are preserved.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    temp_dir: PathBuf,
    base_dir: PathBuf,
    preserve_file_name: bool,
}

impl LocalDriver {
    /// Create a driver staging under `temp_dir` and finalizing under
    /// `base_dir`.
    pub fn new(temp_dir: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            base_dir: base_dir.into(),
            preserve_file_name: false,
        }
    }

    /// Finalize into `<base_dir>/<upload_id>/<file_name>` when the session
    /// carries a file name.
    #[must_use]
    pub fn with_preserve_file_name(mut self, preserve: bool) -> Self {
        self.preserve_file_name = preserve;
        self
    }

    fn staging_dir(&self, session: &UploadSession) -> PathBuf {
        self.temp_dir.join(session.upload_id.as_str())
    }

    fn chunk_path(&self, session: &UploadSession, index: u32) -> PathBuf {
        // Zero-padding makes lexicographic order equal numeric order.
        self.staging_dir(session).join(format!("chunk_{index:06}"))
    }

    fn final_path(&self, session: &UploadSession) -> PathBuf {
        match (&session.file_name, self.preserve_file_name) {
            (Some(name), true) => self
                .base_dir
                .join(session.upload_id.as_str())
                .join(name),
            _ => {
                let ext = session
                    .file_name
                    .as_deref()
                    .and_then(|name| Path::new(name).extension())
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_default();
                self.base_dir
                    .join(format!("{}{ext}", session.upload_id.as_str()))
            }
        }
    }
}

#[async_trait]
impl StorageDriver for LocalDriver {
    async fn init_upload(&self, session: &UploadSession) -> Result<(), StorageError> {
        fs::create_dir_all(self.staging_dir(session)).await?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(upload_id = %session.upload_id, index))]
    async fn write_chunk(
        &self,
        session: &UploadSession,
        index: u32,
        body: ByteStream,
        expected_size: u64,
        hash: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.chunk_path(session, index);
        let mut hasher = hash.map(|_| Sha256::new());

        {
            // Pipe the request body straight to disk, hashing it on the way
            // past when a checksum was supplied.
            let inspected = body.inspect(|result| {
                if let (Ok(chunk), Some(hasher)) = (result, hasher.as_mut()) {
                    hasher.update(chunk);
                }
            });
            let mut reader = StreamReader::new(inspected);
            let mut file = fs::File::create(&path).await?;
            tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
        }

        // Check the on-disk length, not the copied byte count: a short
        // write would otherwise go unnoticed.
        let written = fs::metadata(&path).await?.len();
        if written != expected_size {
            let _ = fs::remove_file(&path).await;
            return Err(StorageError::SizeMismatch {
                expected: expected_size,
                actual: written,
            });
        }

        if let (Some(expected_hash), Some(hasher)) = (hash, hasher) {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected_hash) {
                let _ = fs::remove_file(&path).await;
                return Err(StorageError::HashMismatch {
                    expected: expected_hash.to_owned(),
                    actual,
                });
            }
        }

        debug!(bytes = written, path = %path.display(), "chunk staged");
        Ok(())
    }

    #[instrument(skip(self), fields(upload_id = %session.upload_id))]
    async fn finalize_upload(
        &self,
        session: &UploadSession,
    ) -> Result<StorageLocation, StorageError> {
        let staging = self.staging_dir(session);
        let final_path = self.final_path(session);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut names = Vec::new();
        let mut dir = fs::read_dir(&staging).await?;
        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name());
        }
        // Lexicographic order equals chunk order thanks to the zero-padded
        // index in the file name.
        names.sort();

        let mut output = fs::File::create(&final_path).await?;
        for name in &names {
            let mut chunk = fs::File::open(staging.join(name)).await?;
            tokio::io::copy(&mut chunk, &mut output).await?;
        }
        output.flush().await?;
        drop(output);

        fs::remove_dir_all(&staging).await?;

        debug!(path = %final_path.display(), chunks = names.len(), "artifact assembled");
        Ok(StorageLocation::Local {
            path: final_path.to_string_lossy().into_owned(),
        })
    }

    async fn abort_upload(&self, session: &UploadSession) -> Result<(), StorageError> {
        match fs::remove_dir_all(self.staging_dir(session)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
