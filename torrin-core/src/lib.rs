pub mod error;
pub mod id;
pub mod layout;
pub mod session;

pub use error::{ErrorBody, ErrorDetail, UploadError};
pub use id::UploadId;
pub use layout::{ChunkLayout, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use session::{
    CompleteResult, SessionUpdate, StorageLocation, UploadInit, UploadSession, UploadStatus,
    UploadStatusReport,
};
