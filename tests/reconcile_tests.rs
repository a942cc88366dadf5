use std::collections::BTreeSet;

use bucketsync::hash::{compute_bytes, ContentIdentity, HashAlgorithm};
use bucketsync::sync::{diff, Inventory, InventoryEntry, Origin, SyncDirection};

fn id(content: &str) -> ContentIdentity {
    compute_bytes(content.as_bytes(), HashAlgorithm::Md5)
}

fn local(entries: &[(&str, &str)]) -> Inventory {
    entries
        .iter()
        .map(|(path, content)| InventoryEntry {
            relative_path: path.to_string(),
            identity: id(content),
            origin: Origin::File(format!("/data/{path}").into()),
        })
        .collect()
}

fn remote(entries: &[(&str, &str)]) -> Inventory {
    entries
        .iter()
        .map(|(path, content)| InventoryEntry {
            relative_path: path.to_string(),
            identity: id(content),
            origin: Origin::Object(format!("root/{path}")),
        })
        .collect()
}

fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_push_uploads_changes_and_deletes_extras() {
    let local = local(&[("a.txt", "H1"), ("b.txt", "H2")]);
    let remote = remote(&[("a.txt", "H1"), ("c.txt", "H3")]);

    let plan = diff(&local, &remote, SyncDirection::Push);

    assert_eq!(plan.to_upload, set(&["b.txt"]));
    assert_eq!(plan.to_delete, set(&["c.txt"]));
    assert!(plan.to_download.is_empty());
    assert_eq!(plan.unchanged, 1);
}

#[test]
fn test_push_uploads_on_identity_mismatch() {
    let local = local(&[("a.txt", "new")]);
    let remote = remote(&[("a.txt", "old")]);

    let plan = diff(&local, &remote, SyncDirection::Push);

    assert_eq!(plan.to_upload, set(&["a.txt"]));
    assert!(plan.to_delete.is_empty());
}

#[test]
fn test_pull_is_additive_only() {
    let plan = diff(&local(&[]), &remote(&[("a.txt", "H1")]), SyncDirection::Pull);
    assert_eq!(plan.to_download, set(&["a.txt"]));
    assert!(plan.to_delete.is_empty());
    assert!(plan.to_upload.is_empty());

    // Local-only files are never scheduled for deletion
    let plan = diff(
        &local(&[("mine.txt", "x"), ("a.txt", "stale")]),
        &remote(&[("a.txt", "H1")]),
        SyncDirection::Pull,
    );
    assert_eq!(plan.to_download, set(&["a.txt"]));
    assert!(plan.to_delete.is_empty());
}

#[test]
fn test_identical_sides_are_a_no_op() {
    let files = [("a.txt", "1"), ("dir/b.txt", "2"), ("dir/sub/c.txt", "3")];

    for direction in [SyncDirection::Push, SyncDirection::Pull] {
        let plan = diff(&local(&files), &remote(&files), direction);
        assert!(plan.is_empty(), "{direction} plan should be empty");
        assert_eq!(plan.unchanged, files.len());
    }
}

#[test]
fn test_diff_ignores_insertion_order() {
    let files = [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")];
    let mut reversed = files;
    reversed.reverse();
    let remote_files = [("b", "2"), ("c", "changed"), ("e", "5")];
    let mut remote_reversed = remote_files;
    remote_reversed.reverse();

    for direction in [SyncDirection::Push, SyncDirection::Pull] {
        let forward = diff(&local(&files), &remote(&remote_files), direction);
        let backward = diff(&local(&reversed), &remote(&remote_reversed), direction);
        assert_eq!(forward, backward);
    }
}

#[test]
fn test_upload_and_delete_never_overlap() {
    let local = local(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let remote = remote(&[("b", "changed"), ("c", "3"), ("d", "4"), ("e", "5")]);

    let plan = diff(&local, &remote, SyncDirection::Push);

    assert!(plan.to_upload.is_disjoint(&plan.to_delete));
    assert_eq!(plan.to_upload, set(&["a", "b"]));
    assert_eq!(plan.to_delete, set(&["d", "e"]));
    assert_eq!(plan.len(), 4);
}

#[test]
fn test_empty_local_deletes_everything_on_push() {
    let remote = remote(&[("a", "1"), ("b", "2")]);

    let plan = diff(&local(&[]), &remote, SyncDirection::Push);

    assert!(plan.to_upload.is_empty());
    assert_eq!(plan.to_delete, set(&["a", "b"]));
}

#[test]
fn test_quoted_etag_matches_local_hash() {
    let local = local(&[("empty.txt", "")]);
    let mut remote = Inventory::new();
    remote.insert(InventoryEntry {
        relative_path: "empty.txt".to_string(),
        identity: ContentIdentity::from_reported(
            HashAlgorithm::Md5,
            "\"d41d8cd98f00b204e9800998ecf8427e\"",
        ),
        origin: Origin::Object("root/empty.txt".to_string()),
    });

    let plan = diff(&local, &remote, SyncDirection::Push);
    assert!(plan.is_empty());
}

#[test]
fn test_multipart_etag_always_differs() {
    let local = local(&[("big.bin", "payload")]);
    let mut remote = Inventory::new();
    remote.insert(InventoryEntry {
        relative_path: "big.bin".to_string(),
        identity: ContentIdentity::from_reported(HashAlgorithm::Md5, "\"9b2cf535f27731c974343645a3985328-3\""),
        origin: Origin::Object("root/big.bin".to_string()),
    });

    let plan = diff(&local, &remote, SyncDirection::Push);
    assert_eq!(plan.to_upload, set(&["big.bin"]));
}
