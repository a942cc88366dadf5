//! One-shot upload handles.
//!
//! An [`UploadHandle`] owns the open local reader for one upload from the
//! moment [`Uploader::prepare`] creates it. Exactly one terminal call,
//! `send` or `abort`, releases the reader; a state flag rejects any
//! later call.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SyncError, TransferError};
use crate::fs::{BoxedReader, FileSystem, ObjectStore};

/// A prepared transfer that has not yet touched the store.
#[async_trait]
pub trait Transfer: Send {
    /// Destination key
    fn key(&self) -> &str;

    /// Issue the store request, releasing the local reader afterwards
    async fn send(&mut self) -> Result<u64>;

    /// Release the local reader without issuing any request
    fn abort(&mut self);

    /// Whether `send` or `abort` has been called
    fn is_finished(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Sent,
    Aborted,
}

/// Pending upload of one local file to one key.
pub struct UploadHandle {
    relative_path: String,
    key: String,
    reader: Option<BoxedReader>,
    store: Arc<dyn ObjectStore>,
    state: HandleState,
}

impl UploadHandle {
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn state(&self) -> HandleState {
        self.state
    }
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("relative_path", &self.relative_path)
            .field("key", &self.key)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl Transfer for UploadHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn send(&mut self) -> Result<u64> {
        if self.state != HandleState::Pending {
            return Err(TransferError::AlreadyFinished {
                key: self.key.clone(),
            }
            .into());
        }
        // Marked before the request so a failed send is still terminal
        self.state = HandleState::Sent;

        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => {
                return Err(TransferError::AlreadyFinished {
                    key: self.key.clone(),
                }
                .into())
            }
        };
        let result = self.store.put(&self.key, &mut *reader).await;
        drop(reader);

        debug!(key = %self.key, ok = result.is_ok(), "upload handle sent");
        result
    }

    fn abort(&mut self) {
        if self.state != HandleState::Pending {
            warn!(key = %self.key, state = ?self.state, "abort on a finished upload handle");
            return;
        }
        self.state = HandleState::Aborted;
        self.reader.take();
        debug!(key = %self.key, "upload handle aborted");
    }

    fn is_finished(&self) -> bool {
        self.state != HandleState::Pending
    }
}

/// Factory for upload handles: the single place a local reader is opened.
#[derive(Clone)]
pub struct Uploader {
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn ObjectStore>,
}

impl Uploader {
    pub fn new(fs: Arc<dyn FileSystem>, store: Arc<dyn ObjectStore>) -> Self {
        Self { fs, store }
    }

    /// Open `source` and bind it to `key` without contacting the store.
    pub async fn prepare(&self, relative_path: &str, source: &Path, key: String) -> Result<UploadHandle> {
        let reader = self
            .fs
            .open_read(source)
            .await
            .map_err(|e| SyncError::io(e, "opening", source))?;

        Ok(UploadHandle {
            relative_path: relative_path.to_string(),
            key,
            reader: Some(reader),
            store: Arc::clone(&self.store),
            state: HandleState::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{LocalFs, MemoryStore};
    use tempfile::TempDir;

    async fn prepared(dir: &TempDir, store: Arc<MemoryStore>) -> UploadHandle {
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"alpha").unwrap();
        Uploader::new(Arc::new(LocalFs), store)
            .prepare("a.txt", &source, "root/a.txt".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_is_one_shot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut handle = prepared(&dir, Arc::clone(&store)).await;

        assert_eq!(handle.send().await.unwrap(), 5);
        assert_eq!(handle.state(), HandleState::Sent);
        assert_eq!(store.object("root/a.txt").unwrap(), b"alpha");

        let err = handle.send().await.unwrap_err();
        assert_eq!(err.kind(), "transfer");
        assert_eq!(store.calls().put(), 1);
    }

    #[tokio::test]
    async fn test_abort_issues_no_request() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut handle = prepared(&dir, Arc::clone(&store)).await;

        handle.abort();
        assert!(handle.is_finished());
        assert!(handle.send().await.is_err());

        // Second abort is a no-op
        handle.abort();
        assert_eq!(handle.state(), HandleState::Aborted);
        assert_eq!(store.calls().put(), 0);
    }

    #[tokio::test]
    async fn test_prepare_missing_file() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let uploader = Uploader::new(Arc::new(LocalFs), store);

        let err = uploader
            .prepare("gone.txt", &dir.path().join("gone.txt"), "gone.txt".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
