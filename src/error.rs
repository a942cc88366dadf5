// Centralized error handling module
// Every failure a sync run can hit, classified by the phase that decides
// whether it aborts the run or is recorded against a single item

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for bucketsync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or missing configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Local traversal failed (stat, open or read while walking)
    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Remote listing failed
    #[error("Failed to list objects under '{prefix}': {message}")]
    List { prefix: String, message: String },

    /// File open/read/write failure with context
    #[error("I/O error while {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: io::Error,
    },

    /// The store rejected a put, get or delete
    #[error("Transfer failed for '{key}': {message}")]
    Transfer { key: String, message: String },

    /// A path cannot be expressed relative to its root
    #[error("Path '{path}' is not under root '{root}'")]
    InvalidPath { path: String, root: String },

    /// The plan wants to delete more objects than allowed
    #[error("Refusing to delete {deletions} objects (limit is {threshold})")]
    Guard { deletions: usize, threshold: usize },
}

impl SyncError {
    /// Create an Io error with context about the operation and path
    pub fn io(err: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            path: path.into(),
            operation: operation.to_string(),
            source: err,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    pub fn transfer(key: &str, err: impl std::fmt::Display) -> Self {
        SyncError::Transfer {
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    /// Short classification used in logs and JSON reports
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config { .. } => "config",
            SyncError::Walk { .. } => "walk",
            SyncError::List { .. } => "list",
            SyncError::Io { .. } => "io",
            SyncError::Transfer { .. } => "transfer",
            SyncError::InvalidPath { .. } => "invalid_path",
            SyncError::Guard { .. } => "guard",
        }
    }
}

/// Misuse of a one-shot transfer handle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer for '{key}' was already sent or aborted")]
    AlreadyFinished { key: String },
}

impl From<TransferError> for SyncError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::AlreadyFinished { ref key } => SyncError::Transfer {
                key: key.clone(),
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
