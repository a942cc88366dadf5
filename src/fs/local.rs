use async_trait::async_trait;
use jwalk::WalkDir;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::BufWriter;

use crate::error::{Result, SyncError};
use crate::fs::types::{BoxedReader, BoxedWriter};
use crate::sync::exclude::ExcludeDirs;

/// File system capability consumed by a sync run.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Every regular file below `root`, skipping excluded directory subtrees.
    ///
    /// The first entry that cannot be read fails the whole walk.
    async fn walk_files(&self, root: &Path, exclude: &ExcludeDirs) -> Result<Vec<PathBuf>>;

    /// Open a file for reading
    async fn open_read(&self, path: &Path) -> io::Result<BoxedReader>;

    /// Create or truncate a file for writing
    async fn create_write(&self, path: &Path) -> io::Result<BoxedWriter>;

    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Check if a path is an existing directory
    async fn is_dir(&self, path: &Path) -> bool;
}

/// Local disk implementation backed by jwalk and tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    fn walk_blocking(root: &Path, exclude: ExcludeDirs) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .process_read_dir(move |_depth, _path, _state, children| {
                // Prune excluded directories before jwalk descends into them
                for entry in children.iter_mut().flatten() {
                    if entry.file_type.is_dir()
                        && exclude.is_excluded(&entry.file_name.to_string_lossy())
                    {
                        entry.read_children_path = None;
                    }
                }
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                SyncError::Walk {
                    path,
                    source: io::Error::new(io::ErrorKind::Other, e.to_string()),
                }
            })?;

            if entry.file_type().is_file() {
                files.push(entry.path());
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    async fn walk_files(&self, root: &Path, exclude: &ExcludeDirs) -> Result<Vec<PathBuf>> {
        // jwalk reports a missing root as an empty walk on some platforms
        let meta = tokio::fs::metadata(root).await.map_err(|e| SyncError::Walk {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !meta.is_dir() {
            return Err(SyncError::Walk {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "not a directory"),
            });
        }

        let root_buf = root.to_path_buf();
        let exclude = exclude.clone();
        tokio::task::spawn_blocking(move || Self::walk_blocking(&root_buf, exclude))
            .await
            .map_err(|e| SyncError::Walk {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, e),
            })?
    }

    async fn open_read(&self, path: &Path) -> io::Result<BoxedReader> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn create_write(&self, path: &Path) -> io::Result<BoxedWriter> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(BufWriter::new(file)))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
