// Library module for bucketsync
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod error;
pub mod fs;
pub mod hash;
pub mod sync;

pub use error::{Result, SyncError};
