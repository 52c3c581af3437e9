//! Conformance test suite for [`UploadStore`] implementations.
//!
//! Backend crates call [`run_store_conformance_tests`] from their own test
//! module with a fresh store instance.

use std::time::Duration;

use torrin_core::{SessionUpdate, UploadId, UploadInit, UploadStatus};

use crate::error::StoreError;
use crate::store::UploadStore;

fn test_init(file_size: u64) -> UploadInit {
    UploadInit {
        file_name: Some("report.bin".to_owned()),
        file_size,
        mime_type: Some("application/octet-stream".to_owned()),
        metadata: None,
        desired_chunk_size: None,
    }
}

/// Run the full store conformance suite.
///
/// # Errors
///
/// Returns an error if any conformance check fails.
pub async fn run_store_conformance_tests(store: &dyn UploadStore) -> Result<(), StoreError> {
    test_create_and_get(store).await?;
    test_get_missing(store).await?;
    test_update_status(store).await?;
    test_mark_received_idempotent(store).await?;
    test_received_sorted(store).await?;
    test_delete(store).await?;
    test_ttl_hides_session(store).await?;
    test_expired_listing(store).await?;
    Ok(())
}

async fn test_create_and_get(store: &dyn UploadStore) -> Result<(), StoreError> {
    let id = UploadId::generate();
    let created = store
        .create_session(id.clone(), test_init(2_500_000), 1_000_000, 3, None)
        .await?;
    assert_eq!(created.upload_id, id);
    assert_eq!(created.status, UploadStatus::Pending);
    assert_eq!(created.total_chunks, 3);
    assert!(created.expires_at.is_none());

    let fetched = store.get_session(&id).await?;
    assert!(fetched.is_some(), "created session should be readable");
    assert_eq!(fetched.unwrap().file_size, 2_500_000);
    Ok(())
}

async fn test_get_missing(store: &dyn UploadStore) -> Result<(), StoreError> {
    let missing = store.get_session(&UploadId::from("u_missing")).await?;
    assert!(missing.is_none(), "unknown id should read as absent");
    Ok(())
}

async fn test_update_status(store: &dyn UploadStore) -> Result<(), StoreError> {
    let id = UploadId::generate();
    let created = store
        .create_session(id.clone(), test_init(100), 100, 1, None)
        .await?;

    tokio::time::sleep(Duration::from_millis(5)).await;
    let updated = store
        .update_session(&id, SessionUpdate::status(UploadStatus::InProgress))
        .await?;
    assert_eq!(updated.status, UploadStatus::InProgress);
    assert!(
        updated.updated_at > created.updated_at,
        "updated_at should advance on mutation"
    );
    Ok(())
}

async fn test_mark_received_idempotent(store: &dyn UploadStore) -> Result<(), StoreError> {
    let id = UploadId::generate();
    store
        .create_session(id.clone(), test_init(300), 100, 3, None)
        .await?;

    store.mark_chunk_received(&id, 1).await?;
    store.mark_chunk_received(&id, 1).await?;
    let received = store.list_received_chunks(&id).await?;
    assert_eq!(received, vec![1], "re-marking must not double-count");
    Ok(())
}

async fn test_received_sorted(store: &dyn UploadStore) -> Result<(), StoreError> {
    let id = UploadId::generate();
    store
        .create_session(id.clone(), test_init(500), 100, 5, None)
        .await?;

    for index in [4, 0, 2] {
        store.mark_chunk_received(&id, index).await?;
    }
    let received = store.list_received_chunks(&id).await?;
    assert_eq!(received, vec![0, 2, 4], "indices must come back ascending");
    Ok(())
}

async fn test_delete(store: &dyn UploadStore) -> Result<(), StoreError> {
    let id = UploadId::generate();
    store
        .create_session(id.clone(), test_init(100), 100, 1, None)
        .await?;
    store.delete_session(&id).await?;
    assert!(store.get_session(&id).await?.is_none());

    // Deleting again is a no-op.
    store.delete_session(&id).await?;
    Ok(())
}

async fn test_ttl_hides_session(store: &dyn UploadStore) -> Result<(), StoreError> {
    let id = UploadId::generate();
    store
        .create_session(
            id.clone(),
            test_init(100),
            100,
            1,
            Some(Duration::from_millis(10)),
        )
        .await?;
    assert!(store.get_session(&id).await?.is_some());

    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(
        store.get_session(&id).await?.is_none(),
        "expired session should read as absent"
    );
    Ok(())
}

async fn test_expired_listing(store: &dyn UploadStore) -> Result<(), StoreError> {
    let expired_id = UploadId::generate();
    store
        .create_session(
            expired_id.clone(),
            test_init(100),
            100,
            1,
            Some(Duration::from_millis(10)),
        )
        .await?;
    let live_id = UploadId::generate();
    store
        .create_session(live_id.clone(), test_init(100), 100, 1, None)
        .await?;

    tokio::time::sleep(Duration::from_millis(25)).await;

    match store.list_expired_sessions().await {
        Ok(expired) => {
            let ids: Vec<_> = expired.iter().map(|s| s.upload_id.clone()).collect();
            assert!(ids.contains(&expired_id), "expired session should be listed");
            assert!(!ids.contains(&live_id), "live session must not be listed");
        }
        // Listing is an optional capability.
        Err(StoreError::Unsupported(_)) => {}
        Err(e) => return Err(e),
    }
    Ok(())
}
