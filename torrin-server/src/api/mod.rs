pub mod health;
pub mod openapi;
pub mod schemas;
pub mod uploads;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use torrin_engine::UploadService;

use self::openapi::ApiDoc;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The upload service instance.
    pub service: Arc<UploadService>,
}

/// Build the Axum router with all API routes, middleware, and Swagger UI.
///
/// Upload routes are nested under `base_path` (default `/torrin/uploads`);
/// health and metrics stay at the root.
pub fn router(state: AppState, base_path: &str) -> Router {
    let uploads = Router::new()
        .route("/", post(uploads::init_upload))
        .route("/{upload_id}/chunks/{index}", put(uploads::put_chunk))
        .route("/{upload_id}/status", get(uploads::get_status))
        .route("/{upload_id}/complete", post(uploads::complete_upload))
        .route("/{upload_id}", delete(uploads::delete_upload));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .nest(base_path, uploads)
        .with_state(state)
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
