/// Configuration for the S3 storage driver.
#[derive(Debug, Clone)]
pub struct S3DriverConfig {
    /// AWS region (e.g. `"us-east-1"`).
    pub region: String,

    /// Bucket receiving finalized artifacts.
    pub bucket: String,

    /// Key prefix for all objects. Defaults to `"uploads/"`.
    pub key_prefix: String,

    /// Endpoint URL override for S3-compatible services (MinIO,
    /// `LocalStack`). Implies path-style addressing.
    pub endpoint_url: Option<String>,
}

impl S3DriverConfig {
    /// Create a config for the given region and bucket.
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            key_prefix: "uploads/".to_owned(),
            endpoint_url: None,
        }
    }

    /// Set the object key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the endpoint URL override.
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_defaults() {
        let config = S3DriverConfig::new("us-west-2", "artifacts");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.bucket, "artifacts");
        assert_eq!(config.key_prefix, "uploads/");
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn builder_chain() {
        let config = S3DriverConfig::new("eu-west-1", "data")
            .with_key_prefix("torrin/")
            .with_endpoint_url("http://localhost:9000");
        assert_eq!(config.key_prefix, "torrin/");
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
    }
}
