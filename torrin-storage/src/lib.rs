pub mod driver;
pub mod error;

pub use driver::{stream_from_bytes, ByteStream, StorageDriver};
pub use error::StorageError;
