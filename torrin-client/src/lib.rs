//! Torrin upload client
//!
//! A native Rust client for the Torrin resumable chunked-upload protocol.
//! It slices a source into fixed-size chunks, uploads them with bounded
//! concurrency and retry, and can resume an interrupted upload from the
//! server's record of received chunks.
//!
//! # Quick start
//!
//! ```no_run
//! use torrin_client::{TorrinClient, UploadBuilder, UploadSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), torrin_client::Error> {
//!     let client = TorrinClient::new("http://localhost:8080");
//!
//!     let upload = UploadBuilder::new(client, UploadSource::file("movie.mkv"))
//!         .max_concurrency(4)
//!         .build();
//!
//!     upload.on_progress(|p| {
//!         println!("{}% ({} / {} bytes)", p.percentage, p.bytes_uploaded, p.total_bytes);
//!     });
//!
//!     let result = upload.start().await?;
//!     println!("stored at {:?}", result.location);
//!     Ok(())
//! }
//! ```
//!
//! # Resume
//!
//! Configure a [`ResumeStore`] to persist upload state keyed by a stable
//! file fingerprint (`name-size-lastModified`). When the same file is
//! selected again, the client discovers the previous session, asks the
//! server which chunks it already has, and uploads only the rest.

mod client;
mod error;
mod events;
mod gate;
mod resume;
mod retry;
mod source;
mod upload;

pub use client::{TorrinClient, TorrinClientBuilder};
pub use error::Error;
pub use events::{ClientStatus, EventBus, HandlerId, ProgressEvent};
pub use resume::{ClientUploadState, FsResumeStore, MemoryResumeStore, ResumeStore};
pub use retry::RetryPolicy;
pub use source::UploadSource;
pub use upload::{Upload, UploadBuilder, UploadOptions};
