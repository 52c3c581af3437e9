use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use torrin_core::{UploadId, UploadStatus};
use torrin_engine::MetricsSnapshot;

/// Acknowledgement for one received chunk.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceivedResponse {
    pub upload_id: UploadId,
    /// Index of the chunk that was just persisted.
    #[schema(example = 4)]
    pub received_index: u32,
    pub status: UploadStatus,
}

/// Request body for completing an upload.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CompleteRequest {
    /// Optional hex SHA-256 of the whole file; advisory for the shipped
    /// drivers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status indicator.
    #[schema(example = "ok")]
    pub status: String,
    /// Current service metrics snapshot.
    pub metrics: MetricsResponse,
}

/// Upload service counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    /// Sessions created since process start.
    #[schema(example = 12)]
    pub sessions_created: u64,
    /// Chunks accepted.
    #[schema(example = 340)]
    pub chunks_received: u64,
    /// Bytes accepted across all chunks.
    #[schema(example = 356515840)]
    pub bytes_received: u64,
    /// Uploads finalized.
    #[schema(example = 9)]
    pub uploads_completed: u64,
    /// Uploads canceled.
    #[schema(example = 1)]
    pub uploads_canceled: u64,
    /// Sessions removed by cleanup sweeps.
    #[schema(example = 2)]
    pub sessions_cleaned: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snap: MetricsSnapshot) -> Self {
        Self {
            sessions_created: snap.sessions_created,
            chunks_received: snap.chunks_received,
            bytes_received: snap.bytes_received,
            uploads_completed: snap.uploads_completed,
            uploads_canceled: snap.uploads_canceled,
            sessions_cleaned: snap.sessions_cleaned,
        }
    }
}
