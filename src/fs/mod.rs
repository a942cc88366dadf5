pub mod local;
pub mod memory;
pub mod s3;
pub mod store;
pub mod types;

pub use local::{FileSystem, LocalFs};
pub use memory::MemoryStore;
pub use s3::{S3Settings, S3Store};
pub use store::{BackendType, ObjectStore};
pub use types::*;
