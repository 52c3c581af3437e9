use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UploadId;
use crate::layout::ChunkLayout;

/// Lifecycle state of an upload session.
///
/// Transitions are monotonic: `pending -> in_progress` on the first chunk,
/// `pending | in_progress -> completed` on a successful finalize,
/// `pending | in_progress -> canceled` on abort or sweep. `failed` is part
/// of the taxonomy for drivers that want to park an unrecoverable session;
/// the reference service never sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl UploadStatus {
    /// Return the wire representation of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns `true` if no further transition may leave this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Returns `true` if the legal state machine admits `self -> to`.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::InProgress)
            | (Self::Pending | Self::InProgress, Self::Completed)
            | (Self::Pending | Self::InProgress, Self::Canceled)
            | (Self::Pending | Self::InProgress, Self::Failed) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative record of one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Opaque id, unique within a store.
    pub upload_id: UploadId,
    /// Original file name, if the client supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// MIME type, informational.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Arbitrary key/value map carried end-to-end unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Total file length in bytes. Positive, immutable.
    pub file_size: u64,
    /// Chunk length in bytes. Immutable once the session exists.
    pub chunk_size: u64,
    /// `ceil(file_size / chunk_size)`.
    pub total_chunks: u32,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    /// Advances on any mutation.
    pub updated_at: DateTime<Utc>,
    /// Set iff the session was created with a TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    /// The chunk layout implied by this session's immutable geometry.
    #[must_use]
    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout {
            file_size: self.file_size,
            chunk_size: self.chunk_size,
            total_chunks: self.total_chunks,
        }
    }

    /// Returns `true` if the session's TTL deadline has passed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Input for creating a new upload session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UploadInit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Total file length in bytes; must be positive.
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Requested chunk size; normalized by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_chunk_size: Option<u64>,
}

/// Partial update applied to a stored session.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<UploadStatus>,
}

impl SessionUpdate {
    /// An update that only moves the session to `status`.
    #[must_use]
    pub fn status(status: UploadStatus) -> Self {
        Self {
            status: Some(status),
        }
    }
}

/// Where a finalized artifact landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageLocation {
    /// Artifact on the local filesystem.
    Local { path: String },
    /// Artifact as an S3 object.
    S3 {
        bucket: String,
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        etag: Option<String>,
    },
}

/// Result of a successful finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CompleteResult {
    pub upload_id: UploadId,
    pub status: UploadStatus,
    pub file_size: u64,
    pub location: StorageLocation,
}

/// Point-in-time view of a session and its received-chunk index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusReport {
    pub upload_id: UploadId,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Ascending indices already persisted.
    pub received_chunks: Vec<u32>,
    /// Ascending complement of `received_chunks` over `[0, total_chunks)`.
    pub missing_chunks: Vec<u32>,
}
