pub mod builder;
pub mod metrics;
pub mod service;
pub mod sweeper;

pub use builder::{BuildError, UploadServiceBuilder};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use service::{ChunkUpload, CleanupReport, ServiceConfig, UploadService};
pub use sweeper::{CleanupSweeper, SweeperConfig};
