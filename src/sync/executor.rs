//! Plan execution.
//!
//! Push runs in two steps. Construction opens every upload first and is
//! all-or-nothing: if one file cannot be opened, every prepared handle is
//! aborted and the store is never contacted. After that, uploads and
//! deletions are attempted independently and failures are recorded per
//! item. Pull is fail-fast: the first failed download stops new ones from
//! starting, and files already written stay on disk.

use futures::StreamExt;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::fs::{FileSystem, ObjectStore};
use crate::hash;
use crate::sync::inventory::{LocalInventory, Origin, RemoteInventory};
use crate::sync::reconcile::Plan;
use crate::sync::transfer::{Transfer, UploadHandle, Uploader};

/// Default number of item operations in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Kind of store operation behind an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    Upload,
    Delete,
    Download,
}

/// Result of one attempted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub action: ItemAction,
    /// Relative path
    pub path: String,
    /// Store key
    pub key: String,
    pub bytes: u64,
    pub error: Option<String>,
}

impl ItemOutcome {
    fn finished<E: std::fmt::Display>(
        action: ItemAction,
        path: &str,
        key: &str,
        result: std::result::Result<u64, E>,
    ) -> Self {
        let (bytes, error) = match result {
            Ok(bytes) => (bytes, None),
            Err(e) => (0, Some(e.to_string())),
        };
        Self {
            action,
            path: path.to_string(),
            key: key.to_string(),
            bytes,
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the operations of a plan against the store and the local disk.
pub struct Executor {
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
    events: Option<mpsc::UnboundedSender<ItemOutcome>>,
}

impl Executor {
    pub fn new(fs: Arc<dyn FileSystem>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            fs,
            store,
            concurrency: DEFAULT_CONCURRENCY,
            events: None,
        }
    }

    /// Set the worker pool width (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stream every outcome to `events` as it happens
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ItemOutcome>) -> Self {
        self.events = Some(events);
        self
    }

    // A dropped receiver only ends the stream, never the run
    fn emit(&self, outcome: &ItemOutcome) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(outcome.clone());
        }
    }

    /// Open every upload in the plan before any request is made.
    ///
    /// On the first failure all handles prepared so far are aborted, which
    /// closes their files, and the error is returned.
    pub async fn construct_uploads(
        &self,
        plan: &Plan,
        local: &LocalInventory,
        object_root: &str,
    ) -> Result<Vec<UploadHandle>> {
        let uploader = Uploader::new(Arc::clone(&self.fs), Arc::clone(&self.store));
        let mut handles: Vec<UploadHandle> = Vec::with_capacity(plan.to_upload.len());

        for relative_path in &plan.to_upload {
            let prepared = match local.get(relative_path).map(|e| &e.origin) {
                Some(Origin::File(source)) => {
                    let key = hash::to_remote_key(relative_path, object_root);
                    uploader.prepare(relative_path, source, key).await
                }
                _ => Err(SyncError::InvalidPath {
                    path: relative_path.clone(),
                    root: "local inventory".to_string(),
                }),
            };

            match prepared {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(
                        path = %relative_path,
                        prepared = handles.len(),
                        error = %e,
                        "upload construction failed, aborting batch"
                    );
                    for handle in handles.iter_mut() {
                        handle.abort();
                    }
                    return Err(e);
                }
            }
        }

        debug!(handles = handles.len(), "upload batch constructed");
        Ok(handles)
    }

    /// Realize a push plan.
    ///
    /// `Err` means construction failed and nothing reached the store.
    pub async fn execute_push(
        &self,
        plan: &Plan,
        local: &LocalInventory,
        remote: &RemoteInventory,
        object_root: &str,
    ) -> Result<Vec<ItemOutcome>> {
        let handles = self.construct_uploads(plan, local, object_root).await?;
        let mut outcomes = Vec::with_capacity(plan.len());

        let mut sends = futures::stream::iter(handles)
            .map(|mut handle| async move {
                let result = handle.send().await;
                ItemOutcome::finished(ItemAction::Upload, handle.relative_path(), handle.key(), result)
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = sends.next().await {
            match outcome.error {
                None => info!(key = %outcome.key, bytes = outcome.bytes, "uploaded"),
                Some(ref e) => warn!(key = %outcome.key, error = %e, "upload failed"),
            }
            self.emit(&outcome);
            outcomes.push(outcome);
        }

        let store = &self.store;
        let mut deletes = futures::stream::iter(plan.to_delete.iter())
            .map(|relative_path| async move {
                let key = match remote.get(relative_path).map(|e| &e.origin) {
                    Some(Origin::Object(key)) => key.clone(),
                    _ => hash::to_remote_key(relative_path, object_root),
                };
                let result = store.delete(&key).await.map(|_| 0);
                ItemOutcome::finished(ItemAction::Delete, relative_path, &key, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = deletes.next().await {
            match outcome.error {
                None => info!(key = %outcome.key, "deleted"),
                Some(ref e) => warn!(key = %outcome.key, error = %e, "delete failed"),
            }
            self.emit(&outcome);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Realize a pull plan.
    ///
    /// Returns every attempted outcome and, if a download failed, the error
    /// that stopped the run.
    pub async fn execute_pull(
        &self,
        plan: &Plan,
        remote: &RemoteInventory,
        download_root: &Path,
        object_root: &str,
    ) -> (Vec<ItemOutcome>, Option<SyncError>) {
        let failed = AtomicBool::new(false);
        let first_error: std::sync::Mutex<Option<SyncError>> = std::sync::Mutex::new(None);
        let mut outcomes = Vec::with_capacity(plan.to_download.len());

        let failed_ref = &failed;
        let first_error_ref = &first_error;
        let mut downloads = futures::stream::iter(plan.to_download.iter())
            .map(|relative_path| async move {
                // Items not yet started when a failure lands are skipped
                if failed_ref.load(Ordering::SeqCst) {
                    return None;
                }
                let key = match remote.get(relative_path).map(|e| &e.origin) {
                    Some(Origin::Object(key)) => key.clone(),
                    _ => hash::to_remote_key(relative_path, object_root),
                };
                let result = match self.download_one(relative_path, &key, download_root).await {
                    Ok(bytes) => Ok(bytes),
                    Err(e) => {
                        failed_ref.store(true, Ordering::SeqCst);
                        let message = e.to_string();
                        let mut slot = first_error_ref.lock().unwrap_or_else(|p| p.into_inner());
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        Err(message)
                    }
                };
                Some(ItemOutcome::finished(ItemAction::Download, relative_path, &key, result))
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = downloads.next().await {
            let Some(outcome) = outcome else { continue };
            match outcome.error {
                None => info!(key = %outcome.key, bytes = outcome.bytes, "downloaded"),
                Some(ref e) => warn!(key = %outcome.key, error = %e, "download failed"),
            }
            self.emit(&outcome);
            outcomes.push(outcome);
        }
        drop(downloads);

        let error = first_error.into_inner().unwrap_or_else(|p| p.into_inner());
        (outcomes, error)
    }

    async fn download_one(&self, relative_path: &str, key: &str, download_root: &Path) -> Result<u64> {
        let target = local_target(download_root, relative_path)?;

        if let Some(parent) = target.parent() {
            self.fs
                .create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(e, "creating directory", parent))?;
        }

        let mut writer = self
            .fs
            .create_write(&target)
            .await
            .map_err(|e| SyncError::io(e, "creating", &target))?;
        let bytes = self.store.get(key, &mut *writer).await?;
        writer
            .shutdown()
            .await
            .map_err(|e| SyncError::io(e, "closing", &target))?;

        Ok(bytes)
    }
}

/// Local path for a relative path, refusing anything that escapes the root
fn local_target(root: &Path, relative_path: &str) -> Result<PathBuf> {
    let relative = Path::new(relative_path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative_path.is_empty() || escapes {
        return Err(SyncError::InvalidPath {
            path: relative_path.to_string(),
            root: root.display().to_string(),
        });
    }
    Ok(root.join(relative))
}
