use std::sync::Arc;

use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use tower::ServiceExt;

use torrin_engine::UploadServiceBuilder;
use torrin_server::api::{self, AppState};
use torrin_storage_local::LocalDriver;
use torrin_store_memory::MemoryUploadStore;

const FILE_SIZE: u64 = 2_500_000;
const CHUNK_SIZE: u64 = 1_000_000;
const BASE: &str = "/torrin/uploads";

// -- Helpers --------------------------------------------------------------

fn build_app(root: &std::path::Path) -> axum::Router {
    let service = UploadServiceBuilder::new()
        .store(Arc::new(MemoryUploadStore::new()))
        .driver(Arc::new(LocalDriver::new(
            root.join("tmp"),
            root.join("final"),
        )))
        .build()
        .expect("service should build");
    api::router(
        AppState {
            service: Arc::new(service),
        },
        BASE,
    )
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn create_session(app: &axum::Router) -> serde_json::Value {
    let body = serde_json::json!({
        "fileName": "payload.bin",
        "fileSize": FILE_SIZE,
        "desiredChunkSize": CHUNK_SIZE,
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri(format!("{BASE}/"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

async fn put_chunk(
    app: &axum::Router,
    upload_id: &str,
    index: &str,
    declared_size: u64,
    body: Vec<u8>,
) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(http::Method::PUT)
                .uri(format!("{BASE}/{upload_id}/chunks/{index}"))
                .header(http::header::CONTENT_LENGTH, declared_size)
                .header(http::header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_status(app: &axum::Router, upload_id: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(format!("{BASE}/{upload_id}/status"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

// -- Tests ----------------------------------------------------------------

#[tokio::test]
async fn health_returns_200() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["metrics"].is_object());
}

#[tokio::test]
async fn init_returns_session_summary() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap();
    assert!(upload_id.starts_with("u_"));
    assert_eq!(session["chunkSize"], CHUNK_SIZE);
    assert_eq!(session["totalChunks"], 3);
    assert_eq!(session["status"], "pending");
}

#[tokio::test]
async fn init_rejects_zero_file_size() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri(format!("{BASE}/"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"fileSize": 0}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn full_upload_round_trip_out_of_order() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    // Upload in the order 2, 0, 1.
    let response = put_chunk(&app, &upload_id, "2", 500_000, vec![2u8; 500_000]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = json_body(response).await;
    assert_eq!(ack["receivedIndex"], 2);
    assert_eq!(ack["status"], "in_progress");

    let status = json_body(get_status(&app, &upload_id).await).await;
    assert_eq!(status["receivedChunks"], serde_json::json!([2]));
    assert_eq!(status["missingChunks"], serde_json::json!([0, 1]));

    let response = put_chunk(
        &app,
        &upload_id,
        "0",
        CHUNK_SIZE,
        vec![0u8; CHUNK_SIZE as usize],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let status = json_body(get_status(&app, &upload_id).await).await;
    assert_eq!(status["receivedChunks"], serde_json::json!([0, 2]));

    let response = put_chunk(
        &app,
        &upload_id,
        "1",
        CHUNK_SIZE,
        vec![1u8; CHUNK_SIZE as usize],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri(format!("{BASE}/{upload_id}/complete"))
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = json_body(response).await;
    assert_eq!(result["status"], "completed");
    assert_eq!(result["location"]["type"], "local");

    let path = result["location"]["path"].as_str().unwrap();
    assert_eq!(std::fs::metadata(path).unwrap().len(), FILE_SIZE);

    let status = json_body(get_status(&app, &upload_id).await).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["missingChunks"], serde_json::json!([]));
}

#[tokio::test]
async fn wrong_declared_size_is_rejected_with_details() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    // Last chunk expects 500_000 bytes.
    let response = put_chunk(
        &app,
        &upload_id,
        "2",
        CHUNK_SIZE,
        vec![0u8; CHUNK_SIZE as usize],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "CHUNK_SIZE_MISMATCH");
    assert_eq!(json["error"]["details"]["expected"], 500_000);
    assert_eq!(json["error"]["details"]["actual"], CHUNK_SIZE);
}

#[tokio::test]
async fn missing_content_length_is_invalid_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::PUT)
                .uri(format!("{BASE}/{upload_id}/chunks/0"))
                .header(http::header::CONTENT_TYPE, "application/octet-stream")
                .header(http::header::TRANSFER_ENCODING, "chunked")
                .body(Body::from(vec![0u8; 16]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn non_numeric_index_is_invalid_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    let response = put_chunk(&app, &upload_id, "abc", 16, vec![0u8; 16]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn out_of_range_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    let response = put_chunk(&app, &upload_id, "3", 500_000, vec![0u8; 500_000]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "CHUNK_OUT_OF_RANGE");
}

#[tokio::test]
async fn complete_with_gap_lists_missing_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    put_chunk(&app, &upload_id, "0", CHUNK_SIZE, vec![0u8; CHUNK_SIZE as usize]).await;
    put_chunk(&app, &upload_id, "2", 500_000, vec![2u8; 500_000]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri(format!("{BASE}/{upload_id}/complete"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "MISSING_CHUNKS");
    assert_eq!(json["error"]["details"]["missingChunks"], serde_json::json!([1]));
}

#[tokio::test]
async fn delete_is_idempotent_and_blocks_further_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let session = create_session(&app).await;
    let upload_id = session["uploadId"].as_str().unwrap().to_owned();

    let delete = |app: axum::Router, id: String| async move {
        app.oneshot(
            Request::builder()
                .method(http::Method::DELETE)
                .uri(format!("{BASE}/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    };

    let response = delete(app.clone(), upload_id.clone()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Repeated delete stays 204.
    let response = delete(app.clone(), upload_id.clone()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = put_chunk(&app, &upload_id, "0", CHUNK_SIZE, vec![0u8; CHUNK_SIZE as usize]).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "UPLOAD_CANCELED");
}

#[tokio::test]
async fn unknown_upload_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let response = get_status(&app, "u_doesnotexist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "UPLOAD_NOT_FOUND");
}

#[tokio::test]
async fn malformed_upload_id_is_invalid_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(dir.path());

    let response = get_status(&app, "not-an-id").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "INVALID_REQUEST");
}
