//! Inventory collection.
//!
//! Builds the two snapshots a run compares: the local tree under one or
//! more roots, and the objects under a store prefix. Both are keyed by the
//! same relative-path namespace so the reconciler can diff them directly.

use futures::{StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SyncError};
use crate::fs::{FileSystem, ObjectStore};
use crate::hash::{self, ContentIdentity, IdentityScheme};
use crate::sync::exclude::ExcludeDirs;

/// Files hashed concurrently while building a local inventory
const HASH_CONCURRENCY: usize = 8;

/// Where an inventory entry was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Absolute or root-joined local path
    File(PathBuf),
    /// Full store key
    Object(String),
}

/// One path in an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Forward-slash path relative to the inventory root
    pub relative_path: String,
    pub identity: ContentIdentity,
    pub origin: Origin,
}

/// Snapshot mapping relative paths to content identities.
///
/// Paths are unique; inserting an existing path replaces the earlier entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<String, InventoryEntry>,
}

pub type LocalInventory = Inventory;
pub type RemoteInventory = Inventory;

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&mut self, entry: InventoryEntry) -> Option<InventoryEntry> {
        self.entries.insert(entry.relative_path.clone(), entry)
    }

    pub fn get(&self, relative_path: &str) -> Option<&InventoryEntry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn identity(&self, relative_path: &str) -> Option<&ContentIdentity> {
        self.entries.get(relative_path).map(|e| &e.identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Merge `other` into this inventory; entries of `other` win on collision
    pub fn merge(&mut self, other: Inventory) {
        for (_, entry) in other.entries {
            if let Some(previous) = self.insert(entry) {
                warn!(
                    path = %previous.relative_path,
                    "duplicate relative path across roots, keeping the last one"
                );
            }
        }
    }
}

impl Extend<InventoryEntry> for Inventory {
    fn extend<I: IntoIterator<Item = InventoryEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl FromIterator<InventoryEntry> for Inventory {
    fn from_iter<I: IntoIterator<Item = InventoryEntry>>(iter: I) -> Self {
        let mut inventory = Inventory::new();
        inventory.extend(iter);
        inventory
    }
}

/// Walk `root` and hash every regular file outside excluded directories.
///
/// Files are hashed with `scheme`, which must match the scheme of the store
/// the inventory is compared against. Fails fast: the first file that cannot
/// be listed, opened or read aborts the build with a `Walk` error naming it.
pub async fn build_local(
    fs: &dyn FileSystem,
    root: &Path,
    exclude: &ExcludeDirs,
    scheme: impl Into<IdentityScheme>,
) -> Result<LocalInventory> {
    let scheme = scheme.into();
    let files = fs.walk_files(root, exclude).await?;
    debug!(root = %root.display(), files = files.len(), "walked local root");

    let entries: Vec<InventoryEntry> = futures::stream::iter(files)
        .map(|path| async move {
            let relative_path = hash::local_relative(&path, root)?;
            let identity = hash::compute_file(fs, &path, scheme)
                .await
                .map_err(into_walk_error)?;
            Ok::<_, SyncError>(InventoryEntry {
                relative_path,
                identity,
                origin: Origin::File(path),
            })
        })
        .buffer_unordered(HASH_CONCURRENCY)
        .try_collect()
        .await?;

    let mut inventory = Inventory::new();
    for entry in entries {
        if let Some(previous) = inventory.insert(entry) {
            warn!(path = %previous.relative_path, "walk reported a path twice");
        }
    }

    info!(root = %root.display(), files = inventory.len(), "local inventory built");
    Ok(inventory)
}

/// Build one local inventory from several roots, in order.
///
/// Every root maps onto the same relative namespace; when two roots hold
/// the same relative path the later root wins.
pub async fn build_local_many(
    fs: &dyn FileSystem,
    roots: &[PathBuf],
    exclude: &ExcludeDirs,
    scheme: impl Into<IdentityScheme>,
) -> Result<LocalInventory> {
    let scheme = scheme.into();
    let mut inventory = Inventory::new();
    for root in roots {
        let part = build_local(fs, root, exclude, scheme).await?;
        inventory.merge(part);
    }
    Ok(inventory)
}

/// Page through every object under `object_prefix`.
///
/// Keys are made relative to the prefix; directory markers and the prefix
/// object itself are skipped. Identities use the store's declared algorithm.
pub async fn build_remote(store: &dyn ObjectStore, object_prefix: &str) -> Result<RemoteInventory> {
    let algorithm = store.identity_algorithm();
    let mut inventory = Inventory::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list(object_prefix, token.as_deref()).await?;
        pages += 1;

        for object in page.entries {
            if object.is_dir_marker() {
                continue;
            }
            let relative_path = hash::key_to_relative(&object.key, object_prefix)?;
            if relative_path.is_empty() {
                continue;
            }
            trace!(key = %object.key, size = %object.format_size(), "listed object");

            let raw = object.etag.as_deref().unwrap_or_else(|| {
                debug!(key = %object.key, "object listed without an identity");
                ""
            });
            let entry = InventoryEntry {
                relative_path,
                identity: ContentIdentity::from_reported(algorithm, raw),
                origin: Origin::Object(object.key),
            };
            if let Some(previous) = inventory.insert(entry) {
                warn!(path = %previous.relative_path, "listing reported a key twice");
            }
        }

        if !page.is_truncated {
            break;
        }

        match page.next_token {
            Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
            Some(_) => {
                return Err(SyncError::List {
                    prefix: object_prefix.to_string(),
                    message: "continuation token did not advance".to_string(),
                })
            }
            None => {
                return Err(SyncError::List {
                    prefix: object_prefix.to_string(),
                    message: "truncated page without a continuation token".to_string(),
                })
            }
        }
    }

    info!(prefix = object_prefix, objects = inventory.len(), pages, "remote inventory built");
    Ok(inventory)
}

/// Hash the local counterparts of `relative_paths` under `root`.
///
/// Files that are missing or unreadable are left out instead of failing,
/// which makes them show up as downloads in a pull plan.
pub async fn probe_local<'a, I>(
    fs: &dyn FileSystem,
    root: &Path,
    relative_paths: I,
    scheme: impl Into<IdentityScheme>,
) -> LocalInventory
where
    I: IntoIterator<Item = &'a str>,
{
    let scheme = scheme.into();
    let paths: Vec<&str> = relative_paths.into_iter().collect();

    futures::stream::iter(paths)
        .map(|relative| async move {
            let path = root.join(relative);
            match hash::compute_file(fs, &path, scheme).await {
                Ok(identity) => Some(InventoryEntry {
                    relative_path: relative.to_string(),
                    identity,
                    origin: Origin::File(path),
                }),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "no usable local copy");
                    None
                }
            }
        })
        .buffer_unordered(HASH_CONCURRENCY)
        .filter_map(|entry| async move { entry })
        .collect::<Inventory>()
        .await
}

fn into_walk_error(err: SyncError) -> SyncError {
    match err {
        SyncError::Io { path, source, .. } => SyncError::Walk { path, source },
        other => other,
    }
}
