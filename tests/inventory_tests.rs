mod common;

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use bucketsync::fs::{ListPage, LocalFs, MemoryStore, ObjectEntry, ObjectStore};
use bucketsync::hash::{compute_bytes, HashAlgorithm};
use bucketsync::sync::{build_local, build_local_many, build_remote, probe_local, ExcludeDirs, Origin};
use bucketsync::{Result, SyncError};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};

#[tokio::test]
async fn test_remote_inventory_follows_every_page() {
    let store = MemoryStore::with_page_size(1000);
    for i in 0..2500 {
        store.insert(&format!("backup/file-{i:05}.txt"), format!("content {i}"));
    }
    store.insert("other/ignored.txt", "x");

    let inventory = build_remote(&store, "backup").await.unwrap();

    assert_eq!(inventory.len(), 2500);
    assert_eq!(store.calls().list(), 3);
    for i in 0..2500 {
        let path = format!("file-{i:05}.txt");
        let expected = compute_bytes(format!("content {i}").as_bytes(), HashAlgorithm::Md5);
        assert_eq!(inventory.identity(&path), Some(&expected), "{path}");
    }
    assert!(!inventory.contains("ignored.txt"));
}

#[tokio::test]
async fn test_remote_inventory_strips_prefix_and_markers() {
    let store = MemoryStore::new();
    store.insert("backup/", "");
    store.insert("backup/logs/", "");
    store.insert("backup/logs/app.log", "log");
    store.insert("backupx/not-mine.txt", "x");

    let inventory = build_remote(&store, "backup").await.unwrap();

    assert_eq!(inventory.paths().collect::<Vec<_>>(), vec!["logs/app.log"]);
    let entry = inventory.get("logs/app.log").unwrap();
    assert_eq!(entry.origin, Origin::Object("backup/logs/app.log".to_string()));
}

#[tokio::test]
async fn test_remote_inventory_listing_failure() {
    let store = MemoryStore::new();
    store.insert("backup/a.txt", "a");
    store.fail_listing();

    let err = build_remote(&store, "backup").await.unwrap_err();
    assert_eq!(err.kind(), "list");
}

/// Store whose listing claims more pages but never hands out a token
struct StuckStore;

#[async_trait]
impl ObjectStore for StuckStore {
    async fn list(&self, _prefix: &str, _continuation: Option<&str>) -> Result<ListPage> {
        Ok(ListPage {
            entries: vec![ObjectEntry {
                key: "backup/a.txt".to_string(),
                etag: Some("\"0cc175b9c0f1b6a831c399e269772661\"".to_string()),
                size: 1,
            }],
            next_token: None,
            is_truncated: true,
        })
    }

    async fn put(&self, key: &str, _body: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
        Err(SyncError::transfer(key, "read only"))
    }

    async fn get(&self, key: &str, _sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        Err(SyncError::transfer(key, "read only"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Err(SyncError::transfer(key, "read only"))
    }

    fn backend_type(&self) -> bucketsync::fs::BackendType {
        bucketsync::fs::BackendType::Memory
    }

    fn display_key(&self, key: &str) -> String {
        key.to_string()
    }
}

#[tokio::test]
async fn test_truncated_page_without_token_is_an_error() {
    let err = build_remote(&StuckStore, "backup").await.unwrap_err();
    assert_eq!(err.kind(), "list");
    assert!(err.to_string().contains("continuation"));
}

fn tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
    fs::create_dir_all(root.join("src/.git/objects")).unwrap();
    fs::write(root.join("readme.md"), "hello").unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("src/nested/lib.rs"), "").unwrap();
    fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
    fs::write(root.join("src/.git/objects/abc"), "blob").unwrap();
    dir
}

#[tokio::test]
async fn test_local_inventory_skips_excluded_directories() {
    let dir = tree();
    let exclude = ExcludeDirs::from_patterns(&["node_modules", ".git"]).unwrap();

    let inventory = build_local(&LocalFs, dir.path(), &exclude, HashAlgorithm::Md5)
        .await
        .unwrap();

    assert_eq!(
        inventory.paths().collect::<Vec<_>>(),
        vec!["readme.md", "src/main.rs", "src/nested/lib.rs"]
    );
    assert_eq!(
        inventory.identity("readme.md"),
        Some(&compute_bytes(b"hello", HashAlgorithm::Md5))
    );
    assert_eq!(
        inventory.get("src/main.rs").unwrap().origin,
        Origin::File(dir.path().join("src/main.rs"))
    );
}

#[tokio::test]
async fn test_local_inventory_without_exclusions() {
    let dir = tree();

    let inventory = build_local(&LocalFs, dir.path(), &ExcludeDirs::new(), HashAlgorithm::Sha256)
        .await
        .unwrap();

    assert_eq!(inventory.len(), 5);
    assert!(inventory.contains("node_modules/pkg/index.js"));
    assert_eq!(
        inventory.identity("src/nested/lib.rs").unwrap().algorithm(),
        HashAlgorithm::Sha256
    );
}

#[tokio::test]
async fn test_local_inventory_missing_root_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");

    let err = build_local(&LocalFs, &missing, &ExcludeDirs::new(), HashAlgorithm::Md5)
        .await
        .unwrap_err();

    match err {
        SyncError::Walk { path, .. } => assert_eq!(path, missing),
        other => panic!("expected a walk error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreadable_file_fails_the_whole_build() {
    let dir = common::local_tree(&[("a.txt", "a"), ("b.txt", "b"), ("c/d.txt", "d")]);
    let fs = common::CountingFs::failing_open(2);

    let err = build_local(&fs, dir.path(), &ExcludeDirs::new(), HashAlgorithm::Md5)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "walk");
    match err {
        SyncError::Walk { path, .. } => assert!(path.starts_with(dir.path()), "{}", path.display()),
        other => panic!("expected a walk error, got {other:?}"),
    }
    assert_eq!(fs.live_readers(), 0);
}

#[tokio::test]
async fn test_several_roots_share_one_namespace() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    fs::write(first.path().join("a.txt"), "first").unwrap();
    fs::write(first.path().join("shared.txt"), "old").unwrap();
    fs::write(second.path().join("b.txt"), "second").unwrap();
    fs::write(second.path().join("shared.txt"), "new").unwrap();

    let roots: Vec<PathBuf> = vec![first.path().to_path_buf(), second.path().to_path_buf()];
    let inventory = build_local_many(&LocalFs, &roots, &ExcludeDirs::new(), HashAlgorithm::Md5)
        .await
        .unwrap();

    assert_eq!(inventory.len(), 3);
    assert_eq!(
        inventory.identity("shared.txt"),
        Some(&compute_bytes(b"new", HashAlgorithm::Md5))
    );
}

#[tokio::test]
async fn test_probe_local_skips_missing_files() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/here.txt"), "here").unwrap();

    let inventory = probe_local(
        &LocalFs,
        dir.path(),
        ["sub/here.txt", "missing.txt"],
        HashAlgorithm::Md5,
    )
    .await;

    assert_eq!(inventory.paths().collect::<Vec<_>>(), vec!["sub/here.txt"]);
}
