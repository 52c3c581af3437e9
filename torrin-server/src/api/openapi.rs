use utoipa::OpenApi;

use super::{health, schemas, uploads};

/// OpenAPI document for the Torrin HTTP surface.
///
/// Upload paths are documented under the default base path
/// `/torrin/uploads`; deployments that remap the base path serve the same
/// operations at their configured prefix.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Torrin Upload API",
        description = "Resumable chunked-upload protocol"
    ),
    paths(
        health::health,
        health::metrics,
        uploads::init_upload,
        uploads::put_chunk,
        uploads::get_status,
        uploads::complete_upload,
        uploads::delete_upload,
    ),
    components(schemas(
        schemas::ChunkReceivedResponse,
        schemas::CompleteRequest,
        schemas::HealthResponse,
        schemas::MetricsResponse,
        torrin_core::CompleteResult,
        torrin_core::ErrorBody,
        torrin_core::ErrorDetail,
        torrin_core::StorageLocation,
        torrin_core::UploadInit,
        torrin_core::UploadSession,
        torrin_core::UploadStatus,
        torrin_core::UploadStatusReport,
    ))
)]
pub struct ApiDoc;
