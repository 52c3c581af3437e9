//! Backend selection from configuration.

use std::sync::Arc;

use tracing::info;

use torrin_storage::StorageDriver;
use torrin_storage_local::LocalDriver;
use torrin_storage_s3::{S3Driver, S3DriverConfig};
use torrin_store::UploadStore;
use torrin_store_memory::MemoryUploadStore;

use crate::config::{StorageConfig, StoreConfig};
use crate::error::ServerError;

/// Build the session store named by the configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn UploadStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => {
            info!("using in-memory session store");
            Ok(Arc::new(MemoryUploadStore::new()))
        }
        other => Err(ServerError::Config(format!(
            "unknown store backend '{other}' (expected 'memory')"
        ))),
    }
}

/// Build the storage driver named by the configuration.
pub async fn create_driver(config: &StorageConfig) -> Result<Arc<dyn StorageDriver>, ServerError> {
    match config.backend.as_str() {
        "local" => {
            info!(
                temp_dir = %config.local.temp_dir,
                base_dir = %config.local.base_dir,
                "using local storage driver"
            );
            let driver = LocalDriver::new(&config.local.temp_dir, &config.local.base_dir)
                .with_preserve_file_name(config.local.preserve_file_name);
            Ok(Arc::new(driver))
        }
        "s3" => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                ServerError::Config("storage backend 's3' requires a [storage.s3] section".into())
            })?;
            let mut driver_config = S3DriverConfig::new(&s3.region, &s3.bucket)
                .with_key_prefix(&s3.key_prefix);
            if let Some(ref endpoint) = s3.endpoint_url {
                driver_config = driver_config.with_endpoint_url(endpoint);
            }
            info!(bucket = %s3.bucket, region = %s3.region, "using s3 storage driver");
            Ok(Arc::new(S3Driver::new(driver_config).await))
        }
        other => Err(ServerError::Config(format!(
            "unknown storage backend '{other}' (expected 'local' or 's3')"
        ))),
    }
}
