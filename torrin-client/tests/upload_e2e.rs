use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use torrin_client::{
    ClientStatus, ClientUploadState, MemoryResumeStore, ResumeStore, TorrinClient, UploadBuilder,
    UploadSource,
};
use torrin_core::{StorageLocation, UploadError};
use torrin_engine::{UploadService, UploadServiceBuilder};
use torrin_server::api::{self, AppState};
use torrin_storage_local::LocalDriver;
use torrin_store_memory::MemoryUploadStore;

const FILE_SIZE: u64 = 2_500_000;
const CHUNK_SIZE: u64 = 1_000_000;

// -- Helpers --------------------------------------------------------------

async fn spawn_server(root: &Path) -> (String, Arc<UploadService>) {
    let service = Arc::new(
        UploadServiceBuilder::new()
            .store(Arc::new(MemoryUploadStore::new()))
            .driver(Arc::new(LocalDriver::new(
                root.join("tmp"),
                root.join("final"),
            )))
            .build()
            .expect("service should build"),
    );
    let app = api::router(
        AppState {
            service: Arc::clone(&service),
        },
        "/torrin/uploads",
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), service)
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_source_file(dir: &Path, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, patterned(len)).unwrap();
    path
}

fn artifact_path(result: &torrin_core::CompleteResult) -> String {
    match &result.location {
        StorageLocation::Local { path } => path.clone(),
        other => panic!("expected local artifact, got {other:?}"),
    }
}

// -- Tests ----------------------------------------------------------------

#[tokio::test]
async fn full_upload_produces_identical_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, _service) = spawn_server(dir.path()).await;
    let source_path = write_source_file(dir.path(), "movie.mkv", FILE_SIZE as usize);

    let upload = UploadBuilder::new(
        TorrinClient::new(&base_url),
        UploadSource::file(&source_path),
    )
    .chunk_size(CHUNK_SIZE)
    .max_concurrency(3)
    .build();

    let progress = Arc::new(Mutex::new(Vec::new()));
    {
        let progress = Arc::clone(&progress);
        upload.on_progress(move |p| progress.lock().push(*p));
    }
    let statuses = Arc::new(Mutex::new(Vec::new()));
    {
        let statuses = Arc::clone(&statuses);
        upload.on_status(move |s| statuses.lock().push(*s));
    }

    let result = upload.start().await.expect("upload should succeed");
    assert_eq!(upload.status(), ClientStatus::Completed);

    // Artifact is byte-identical to the source.
    let artifact = std::fs::read(artifact_path(&result)).unwrap();
    assert_eq!(artifact, patterned(FILE_SIZE as usize));

    // One progress event per chunk, ending at 100%.
    let progress = progress.lock();
    assert_eq!(progress.len(), 3);
    let last = progress.last().unwrap();
    assert_eq!(last.bytes_uploaded, FILE_SIZE);
    assert_eq!(last.percentage, 100);
    assert_eq!(last.chunks_completed, 3);

    let statuses = statuses.lock();
    assert_eq!(
        *statuses,
        vec![
            ClientStatus::Initializing,
            ClientStatus::Uploading,
            ClientStatus::Completing,
            ClientStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn buffer_upload_works_without_resume() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, _service) = spawn_server(dir.path()).await;

    let data = patterned(700_000);
    let upload = UploadBuilder::new(
        TorrinClient::new(&base_url),
        UploadSource::bytes(Some("blob.bin".into()), data.clone()),
    )
    .build();

    let result = upload.start().await.expect("upload should succeed");
    let artifact = std::fs::read(artifact_path(&result)).unwrap();
    assert_eq!(artifact, data);
}

#[tokio::test]
async fn server_errors_map_back_to_taxonomy() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, _service) = spawn_server(dir.path()).await;
    let client = TorrinClient::new(&base_url);

    let session = client
        .init_upload(&torrin_core::UploadInit {
            file_name: Some("f.bin".into()),
            file_size: FILE_SIZE,
            mime_type: None,
            metadata: None,
            desired_chunk_size: Some(CHUNK_SIZE),
        })
        .await
        .unwrap();

    // Index 2 expects 500_000 bytes; send a full-size chunk instead.
    let err = client
        .upload_chunk(
            &session.upload_id,
            2,
            bytes::Bytes::from(patterned(CHUNK_SIZE as usize)),
            None,
        )
        .await
        .unwrap_err();
    match err {
        torrin_client::Error::Upload(UploadError::ChunkSizeMismatch { expected, actual }) => {
            assert_eq!(expected, 500_000);
            assert_eq!(actual, CHUNK_SIZE);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn resume_uploads_only_missing_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, service) = spawn_server(dir.path()).await;
    let source_path = write_source_file(dir.path(), "big.dat", FILE_SIZE as usize);
    let resume_store: Arc<MemoryResumeStore> = Arc::new(MemoryResumeStore::new());

    // Simulate an interrupted earlier run: session exists server-side with
    // chunks 0 and 1 uploaded, and the client saved its state.
    let client = TorrinClient::new(&base_url);
    let session = client
        .init_upload(&torrin_core::UploadInit {
            file_name: Some("big.dat".into()),
            file_size: FILE_SIZE,
            mime_type: None,
            metadata: None,
            desired_chunk_size: Some(CHUNK_SIZE),
        })
        .await
        .unwrap();
    let data = patterned(FILE_SIZE as usize);
    for index in 0..2u32 {
        let start = (index as u64 * CHUNK_SIZE) as usize;
        let body = bytes::Bytes::copy_from_slice(&data[start..start + CHUNK_SIZE as usize]);
        client
            .upload_chunk(&session.upload_id, index, body, None)
            .await
            .unwrap();
    }
    let file_key = UploadSource::file(&source_path)
        .describe()
        .await
        .unwrap()
        .file_key
        .unwrap();
    resume_store
        .save_state(&ClientUploadState {
            upload_id: session.upload_id.clone(),
            file_name: Some("big.dat".into()),
            file_size: FILE_SIZE,
            chunk_size: CHUNK_SIZE,
            total_chunks: 3,
            received_chunks: vec![0, 1],
            metadata: None,
        })
        .await
        .unwrap();
    resume_store
        .set_file_key(&file_key, &session.upload_id)
        .await
        .unwrap();

    let before = service.metrics().snapshot().chunks_received;
    assert_eq!(before, 2);

    // A fresh client start discovers the session and only uploads chunk 2.
    let upload = UploadBuilder::new(
        TorrinClient::new(&base_url),
        UploadSource::file(&source_path),
    )
    .resume_store(Arc::clone(&resume_store) as Arc<dyn ResumeStore>)
    .build();

    let progress = Arc::new(Mutex::new(Vec::new()));
    {
        let progress = Arc::clone(&progress);
        upload.on_progress(move |p| progress.lock().push(*p));
    }

    let result = upload.start().await.expect("resume should succeed");
    assert_eq!(result.upload_id, session.upload_id);

    // Exactly one more chunk crossed the wire.
    assert_eq!(service.metrics().snapshot().chunks_received, 3);

    // Progress picked up where the earlier run left off.
    let progress = progress.lock();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].chunk_index, 2);
    assert_eq!(progress[0].bytes_uploaded, FILE_SIZE);
    assert_eq!(progress[0].chunks_completed, 3);

    // Artifact is whole and identical.
    let artifact = std::fs::read(artifact_path(&result)).unwrap();
    assert_eq!(artifact, data);

    // The resume record is gone after completion.
    assert!(resume_store.find_by_file(&file_key).await.unwrap().is_none());
}

#[tokio::test]
async fn resume_evicts_finished_session_and_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, _service) = spawn_server(dir.path()).await;
    let source_path = write_source_file(dir.path(), "again.dat", 600_000);
    let resume_store: Arc<MemoryResumeStore> = Arc::new(MemoryResumeStore::new());

    // First upload runs to completion but its state is left behind, as if
    // the process died between finalize and cleanup.
    let first = UploadBuilder::new(
        TorrinClient::new(&base_url),
        UploadSource::file(&source_path),
    )
    .resume_store(Arc::clone(&resume_store) as Arc<dyn ResumeStore>)
    .build();
    let first_result = first.start().await.unwrap();

    let file_key = UploadSource::file(&source_path)
        .describe()
        .await
        .unwrap()
        .file_key
        .unwrap();
    resume_store
        .save_state(&ClientUploadState {
            upload_id: first_result.upload_id.clone(),
            file_name: Some("again.dat".into()),
            file_size: 600_000,
            chunk_size: 600_000,
            total_chunks: 1,
            received_chunks: vec![0],
            metadata: None,
        })
        .await
        .unwrap();
    resume_store
        .set_file_key(&file_key, &first_result.upload_id)
        .await
        .unwrap();

    // The saved session reports completed, so the client evicts it and
    // initializes a new one.
    let second = UploadBuilder::new(
        TorrinClient::new(&base_url),
        UploadSource::file(&source_path),
    )
    .resume_store(Arc::clone(&resume_store) as Arc<dyn ResumeStore>)
    .build();
    let second_result = second.start().await.unwrap();
    assert_ne!(second_result.upload_id, first_result.upload_id);
}

#[tokio::test]
async fn cancel_before_start_rejects_with_upload_canceled() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, _service) = spawn_server(dir.path()).await;
    let source_path = write_source_file(dir.path(), "c.dat", 300_000);

    let upload = UploadBuilder::new(
        TorrinClient::new(&base_url),
        UploadSource::file(&source_path),
    )
    .build();

    upload.cancel().await.unwrap();
    let err = upload.start().await.unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(upload.status(), ClientStatus::Canceled);
}

#[tokio::test]
async fn pause_parks_the_pump_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let (base_url, _service) = spawn_server(dir.path()).await;
    let source_path = write_source_file(dir.path(), "p.dat", 400_000);

    let upload = Arc::new(
        UploadBuilder::new(
            TorrinClient::new(&base_url),
            UploadSource::file(&source_path),
        )
        .build(),
    );
    let progress = Arc::new(Mutex::new(Vec::new()));
    {
        let progress = Arc::clone(&progress);
        upload.on_progress(move |p| progress.lock().push(*p));
    }

    // Pause before starting: chunk tasks park at their first checkpoint.
    upload.pause();
    let runner = {
        let upload = Arc::clone(&upload);
        tokio::spawn(async move { upload.start().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert!(!runner.is_finished(), "paused upload must not finish");
    assert!(progress.lock().is_empty(), "no chunk may complete while paused");

    upload.resume();
    let result = runner.await.unwrap().expect("upload should finish after resume");
    let artifact = std::fs::read(artifact_path(&result)).unwrap();
    assert_eq!(artifact, patterned(400_000));
}
