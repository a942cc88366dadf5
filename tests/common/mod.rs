//! Shared test doubles

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bucketsync::fs::{BoxedReader, BoxedWriter, FileSystem, LocalFs};
use bucketsync::sync::ExcludeDirs;
use bucketsync::Result;
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};

/// Local file system that counts opened readers and can fail the n-th open.
#[derive(Default)]
pub struct CountingFs {
    inner: LocalFs,
    opens: AtomicUsize,
    fail_on_open: Option<usize>,
    live: Arc<AtomicUsize>,
}

impl CountingFs {
    /// Fail the `n`-th call to `open_read` (1-based)
    pub fn failing_open(n: usize) -> Self {
        Self {
            fail_on_open: Some(n),
            ..Default::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Readers opened and not yet dropped
    pub fn live_readers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct TrackedReader {
    inner: BoxedReader,
    live: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileSystem for CountingFs {
    async fn walk_files(&self, root: &Path, exclude: &ExcludeDirs) -> Result<Vec<PathBuf>> {
        self.inner.walk_files(root, exclude).await
    }

    async fn open_read(&self, path: &Path) -> io::Result<BoxedReader> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_open == Some(n) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected open failure"));
        }
        let inner = self.inner.open_read(path).await?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedReader {
            inner,
            live: Arc::clone(&self.live),
        }))
    }

    async fn create_write(&self, path: &Path) -> io::Result<BoxedWriter> {
        self.inner.create_write(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path).await
    }
}

/// Temporary directory holding `files` as `(relative path, content)`
pub fn local_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
    dir
}
