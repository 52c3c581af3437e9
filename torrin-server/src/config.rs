use serde::Deserialize;

/// Top-level configuration for the Torrin server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct TorrinConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session store backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Storage driver backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload session tunables.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Background cleanup configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base path for the upload routes.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: default_base_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_base_path() -> String {
    "/torrin/uploads".to_owned()
}

/// Configuration for the session store backend.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use. Currently `"memory"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_owned()
}

/// Configuration for the storage driver backend.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use: `"local"` or `"s3"`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Local driver settings.
    #[serde(default)]
    pub local: LocalStorageConfig,
    /// S3 driver settings (required when `backend = "s3"`).
    pub s3: Option<S3StorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
            s3: None,
        }
    }
}

fn default_storage_backend() -> String {
    "local".to_owned()
}

/// Settings for the local filesystem driver.
#[derive(Debug, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory for staged chunk files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// Directory receiving finalized artifacts.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// Finalize into `<base_dir>/<upload_id>/<file_name>`.
    #[serde(default)]
    pub preserve_file_name: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            base_dir: default_base_dir(),
            preserve_file_name: false,
        }
    }
}

fn default_temp_dir() -> String {
    "./data/tmp".to_owned()
}

fn default_base_dir() -> String {
    "./data/uploads".to_owned()
}

/// Settings for the S3 driver.
#[derive(Debug, Deserialize)]
pub struct S3StorageConfig {
    /// AWS region.
    pub region: String,
    /// Destination bucket.
    pub bucket: String,
    /// Object key prefix.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Endpoint URL override for S3-compatible services.
    pub endpoint_url: Option<String>,
}

fn default_key_prefix() -> String {
    "uploads/".to_owned()
}

/// Upload session tunables.
#[derive(Debug, Deserialize)]
pub struct UploadConfig {
    /// Default chunk size in bytes when the client requests none.
    pub default_chunk_size: Option<u64>,
    /// Session TTL in seconds; 0 disables expiry.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: None,
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    24 * 60 * 60
}

/// Background cleanup configuration.
#[derive(Debug, Deserialize)]
pub struct CleanupConfig {
    /// Whether the background sweeper runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub interval_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    60
}
