//! In-memory object store.
//!
//! Listing follows S3 semantics: keys come back sorted, `page_size` at a
//! time, and the continuation token is the last key of the previous page.
//! Reported ETags are quoted like S3's, and past an optional part size they
//! take the multipart `<hex>-<parts>` form. Failures can be injected per key.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SyncError};
use crate::fs::store::{BackendType, ObjectStore};
use crate::fs::types::{ListPage, ObjectEntry};
use crate::hash::{compute_bytes, HashAlgorithm};

/// Call counters, for asserting which requests a run issued
#[derive(Debug, Default)]
pub struct CallCounts {
    pub list: AtomicUsize,
    pub put: AtomicUsize,
    pub get: AtomicUsize,
    pub delete: AtomicUsize,
}

impl CallCounts {
    pub fn list(&self) -> usize {
        self.list.load(Ordering::SeqCst)
    }

    pub fn put(&self) -> usize {
        self.put.load(Ordering::SeqCst)
    }

    pub fn get(&self) -> usize {
        self.get.load(Ordering::SeqCst)
    }

    pub fn delete(&self) -> usize {
        self.delete.load(Ordering::SeqCst)
    }
}

pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
    algorithm: HashAlgorithm,
    part_size: Option<usize>,
    failing_keys: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
    calls: CallCounts,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            algorithm: HashAlgorithm::Md5,
            part_size: None,
            failing_keys: Mutex::new(HashSet::new()),
            fail_listing: Mutex::new(false),
            calls: CallCounts::default(),
        }
    }

    /// Report identities with a different algorithm
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Report multipart ETags for objects larger than `part_size`
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = Some(part_size.max(1));
        self
    }

    /// Store an object directly, bypassing call counting
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.lock_objects().insert(key.to_string(), data.into());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock_objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Make every put/get/delete on `key` fail
    pub fn fail_on(&self, key: &str) {
        self.failing_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
    }

    /// Make every listing call fail
    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_key(&self, key: &str) -> Result<()> {
        let failing = self.failing_keys.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(key) {
            return Err(SyncError::transfer(key, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SyncError::List {
                prefix: prefix.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let dir_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix.trim_end_matches('/'))
        };

        let scheme = self.identity_scheme();
        let objects = self.lock_objects();
        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(&dir_prefix))
            .filter(|(key, _)| continuation.map_or(true, |token| key.as_str() > token));

        let mut entries = Vec::new();
        for (key, data) in matching.by_ref().take(self.page_size) {
            entries.push(ObjectEntry {
                key: key.clone(),
                etag: Some(format!("\"{}\"", compute_bytes(data, scheme).as_hex())),
                size: data.len() as u64,
            });
        }

        let is_truncated = matching.next().is_some();
        let next_token = if is_truncated {
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
            is_truncated,
        })
    }

    async fn put(&self, key: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        self.check_key(key)?;

        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .await
            .map_err(|e| SyncError::io(e, "reading upload body for", key))?;
        let len = data.len() as u64;
        self.lock_objects().insert(key.to_string(), data);
        Ok(len)
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.check_key(key)?;

        let data = self
            .object(key)
            .ok_or_else(|| SyncError::transfer(key, "no such key"))?;
        sink.write_all(&data)
            .await
            .map_err(|e| SyncError::io(e, "writing download of", key))?;
        sink.flush()
            .await
            .map_err(|e| SyncError::io(e, "flushing download of", key))?;
        Ok(data.len() as u64)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_key(key)?;
        self.lock_objects().remove(key);
        Ok(())
    }

    fn identity_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn multipart_part_size(&self) -> Option<usize> {
        self.part_size
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn display_key(&self, key: &str) -> String {
        format!("mem://{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pages_follow_tokens() {
        let store = MemoryStore::with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            store.insert(&format!("root/{}", name), name.as_bytes());
        }
        store.insert("other/x", "x");

        let first = store.list("root", None).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(first.is_truncated);
        assert_eq!(first.next_token.as_deref(), Some("root/b"));

        let second = store.list("root", first.next_token.as_deref()).await.unwrap();
        let third = store.list("root", second.next_token.as_deref()).await.unwrap();
        assert_eq!(third.entries.len(), 1);
        assert!(!third.is_truncated);
        assert!(third.next_token.is_none());
        assert_eq!(store.calls().list(), 3);
    }

    #[tokio::test]
    async fn test_etag_is_quoted_md5() {
        let store = MemoryStore::new();
        store.insert("empty.txt", Vec::new());

        let page = store.list("", None).await.unwrap();
        assert_eq!(
            page.entries[0].etag.as_deref(),
            Some("\"d41d8cd98f00b204e9800998ecf8427e\"")
        );
    }

    #[tokio::test]
    async fn test_large_objects_report_multipart_etag() {
        let store = MemoryStore::new().with_part_size(4);
        store.insert("small", "four");
        store.insert("large", "ten bytes!");

        let page = store.list("", None).await.unwrap();
        let etag = |key: &str| {
            page.entries
                .iter()
                .find(|e| e.key == key)
                .and_then(|e| e.etag.clone())
                .unwrap()
        };
        assert!(!etag("small").contains('-'));
        assert!(etag("large").ends_with("-3\""));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new();
        store.insert("k", "v");
        store.fail_on("k");

        assert!(store.delete("k").await.is_err());
        assert_eq!(store.calls().delete(), 1);
        assert!(store.object("k").is_some());
    }
}
