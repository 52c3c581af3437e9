use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::BytesMut;
use dashmap::DashMap;
use futures::StreamExt;
use tracing::{debug, instrument, warn};

use torrin_core::{StorageLocation, UploadSession};
use torrin_storage::{ByteStream, StorageDriver, StorageError};

use crate::config::S3DriverConfig;

/// One uploaded part: S3 part numbers are 1-based.
#[derive(Debug, Clone)]
struct PartRecord {
    part_number: i32,
    etag: String,
}

/// Per-upload multipart state. Process-local: completing or aborting an
/// upload initiated in a different process fails with a storage error.
#[derive(Debug)]
struct MultipartState {
    multipart_id: String,
    key: String,
    parts: Vec<Option<PartRecord>>,
}

type KeyFn = dyn Fn(&UploadSession) -> String + Send + Sync;

/// Storage driver mapping each upload to a native S3 multipart upload.
///
/// Each chunk becomes one part (`PartNumber = index + 1`); finalize
/// references every uploaded part by `{PartNumber, ETag}`. Chunk bodies are
/// buffered in memory because `UploadPart` requires a known-length body.
pub struct S3Driver {
    config: S3DriverConfig,
    client: aws_sdk_s3::Client,
    state: DashMap<String, MultipartState>,
    key_fn: Option<Box<KeyFn>>,
}

impl std::fmt::Debug for S3Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Driver")
            .field("config", &self.config)
            .field("in_flight", &self.state.len())
            .finish_non_exhaustive()
    }
}

impl S3Driver {
    /// Create a driver by building an AWS SDK client from the environment.
    pub async fn new(config: S3DriverConfig) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ref endpoint) = config.endpoint_url {
            // MinIO and friends want path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self::with_client(config, client)
    }

    /// Create a driver with a pre-built client (for testing).
    pub fn with_client(config: S3DriverConfig, client: aws_sdk_s3::Client) -> Self {
        Self {
            config,
            client,
            state: DashMap::new(),
            key_fn: None,
        }
    }

    /// Override object key derivation. The default is
    /// `<key_prefix><YYYY>/<MM>/<upload_id><ext>`.
    #[must_use]
    pub fn with_object_key_fn(
        mut self,
        key_fn: impl Fn(&UploadSession) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    fn object_key(&self, session: &UploadSession) -> String {
        if let Some(key_fn) = &self.key_fn {
            return key_fn(session);
        }
        let ext = session
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        format!(
            "{}{}/{}{ext}",
            self.config.key_prefix,
            session.created_at.format("%Y/%m"),
            session.upload_id.as_str(),
        )
    }
}

/// Uploaded parts in ascending part-number order, omitting unset slots.
fn completed_parts(parts: &[Option<PartRecord>]) -> Vec<CompletedPart> {
    parts
        .iter()
        .flatten()
        .map(|p| {
            CompletedPart::builder()
                .part_number(p.part_number)
                .e_tag(&p.etag)
                .build()
        })
        .collect()
}

#[async_trait]
impl StorageDriver for S3Driver {
    #[instrument(skip(self), fields(upload_id = %session.upload_id))]
    async fn init_upload(&self, session: &UploadSession) -> Result<(), StorageError> {
        let key = self.object_key(session);
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(&key);
        if let Some(ref mime) = session.mime_type {
            request = request.content_type(mime);
        }
        let out = request
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let multipart_id = out
            .upload_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                StorageError::Backend("create_multipart_upload returned no upload id".to_owned())
            })?
            .to_owned();

        debug!(key = %key, multipart_id = %multipart_id, "multipart upload created");
        self.state.insert(
            session.upload_id.as_str().to_owned(),
            MultipartState {
                multipart_id,
                key,
                parts: vec![None; session.total_chunks as usize],
            },
        );
        Ok(())
    }

    #[instrument(skip(self, body), fields(upload_id = %session.upload_id, index))]
    async fn write_chunk(
        &self,
        session: &UploadSession,
        index: u32,
        mut body: ByteStream,
        expected_size: u64,
        _hash: Option<&str>,
    ) -> Result<(), StorageError> {
        // UploadPart needs a known-length body, so buffer the whole chunk.
        let mut buffer = BytesMut::with_capacity(expected_size as usize);
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        if buffer.len() as u64 != expected_size {
            return Err(StorageError::SizeMismatch {
                expected: expected_size,
                actual: buffer.len() as u64,
            });
        }

        let (multipart_id, key) = {
            let state = self
                .state
                .get(session.upload_id.as_str())
                .ok_or_else(|| StorageError::NotInitialized(session.upload_id.clone()))?;
            (state.multipart_id.clone(), state.key.clone())
        };

        let part_number = index as i32 + 1;
        let out = self
            .client
            .upload_part()
            .bucket(&self.config.bucket)
            .key(&key)
            .upload_id(&multipart_id)
            .part_number(part_number)
            .body(aws_sdk_s3::primitives::ByteStream::from(buffer.freeze()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let etag = out.e_tag().unwrap_or_default().to_owned();
        let mut state = self
            .state
            .get_mut(session.upload_id.as_str())
            .ok_or_else(|| StorageError::NotInitialized(session.upload_id.clone()))?;
        // A re-uploaded part number supersedes the prior ETag.
        state.parts[index as usize] = Some(PartRecord { part_number, etag });
        Ok(())
    }

    #[instrument(skip(self), fields(upload_id = %session.upload_id))]
    async fn finalize_upload(
        &self,
        session: &UploadSession,
    ) -> Result<StorageLocation, StorageError> {
        let (multipart_id, key, parts) = {
            let state = self
                .state
                .get(session.upload_id.as_str())
                .ok_or_else(|| StorageError::NotInitialized(session.upload_id.clone()))?;
            (
                state.multipart_id.clone(),
                state.key.clone(),
                completed_parts(&state.parts),
            )
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let out = self
            .client
            .complete_multipart_upload()
            .bucket(&self.config.bucket)
            .key(&key)
            .upload_id(&multipart_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.state.remove(session.upload_id.as_str());
        debug!(key = %key, "multipart upload completed");

        Ok(StorageLocation::S3 {
            bucket: self.config.bucket.clone(),
            key: key.clone(),
            url: Some(format!("s3://{}/{key}", self.config.bucket)),
            etag: out.e_tag().map(str::to_owned),
        })
    }

    #[instrument(skip(self), fields(upload_id = %session.upload_id))]
    async fn abort_upload(&self, session: &UploadSession) -> Result<(), StorageError> {
        // Absent state is a no-op: nothing was initiated by this process.
        let Some((_, state)) = self.state.remove(session.upload_id.as_str()) else {
            return Ok(());
        };

        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.config.bucket)
            .key(&state.key)
            .upload_id(&state.multipart_id)
            .send()
            .await
        {
            warn!(error = %e, key = %state.key, "abort_multipart_upload failed");
            return Err(StorageError::Backend(e.to_string()));
        }
        Ok(())
    }
}
