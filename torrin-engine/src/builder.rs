use std::sync::Arc;

use thiserror::Error;

use torrin_storage::StorageDriver;
use torrin_store::UploadStore;

use crate::metrics::ServiceMetrics;
use crate::service::{ServiceConfig, UploadService};

/// Error returned when the service builder is missing a required seam.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct BuildError(pub String);

/// Fluent builder for an [`UploadService`].
///
/// A store and a driver must be supplied; everything else defaults.
pub struct UploadServiceBuilder {
    store: Option<Arc<dyn UploadStore>>,
    driver: Option<Arc<dyn StorageDriver>>,
    config: ServiceConfig,
}

impl UploadServiceBuilder {
    /// Create a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            driver: None,
            config: ServiceConfig::default(),
        }
    }

    /// Set the session store implementation.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn UploadStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the storage driver implementation.
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn StorageDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Override the default chunk size used when clients don't request one.
    #[must_use]
    pub fn default_chunk_size(mut self, bytes: u64) -> Self {
        self.config.default_chunk_size = bytes;
        self
    }

    /// Set the TTL applied to new sessions; `None` disables expiry.
    #[must_use]
    pub fn session_ttl(mut self, ttl: Option<std::time::Duration>) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    /// Consume the builder and produce a configured [`UploadService`].
    pub fn build(self) -> Result<UploadService, BuildError> {
        let store = self
            .store
            .ok_or_else(|| BuildError("upload store is required".to_owned()))?;
        let driver = self
            .driver
            .ok_or_else(|| BuildError("storage driver is required".to_owned()))?;
        Ok(UploadService {
            store,
            driver,
            config: self.config,
            metrics: Arc::new(ServiceMetrics::default()),
        })
    }
}

impl Default for UploadServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
