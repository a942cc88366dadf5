// Path normalization utilities
// Maps local file paths and remote object keys onto one relative namespace
// that always uses forward slashes and never starts with a separator

use std::path::Path;

use crate::error::{Result, SyncError};

/// Convert every backslash to a forward slash
pub fn normalize_separators(path_str: &str) -> String {
    path_str.replace('\\', "/")
}

/// Normalized string form of a local path
pub fn path_to_slash(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

/// Strip `root` from `full_path` and return the remainder as a relative path.
///
/// Both sides are normalized to `/` first. The prefix match is
/// component-aware, so `/data/ab` is not under `/data/a`. At most one
/// leading `/` left after prefix removal is stripped.
pub fn to_relative(full_path: &str, root: &str) -> Result<String> {
    let full = normalize_separators(full_path);
    let root_norm = normalize_separators(root);
    let root_trimmed = root_norm.trim_end_matches('/');

    let invalid = || SyncError::InvalidPath {
        path: full_path.to_string(),
        root: root.to_string(),
    };

    // An empty root (or "/" trimmed to empty) only strips the leading separator
    if root_trimmed.is_empty() {
        if !root_norm.is_empty() && !full.starts_with('/') {
            return Err(invalid());
        }
        return Ok(strip_one_leading(&full).to_string());
    }

    let rest = full.strip_prefix(root_trimmed).ok_or_else(invalid)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return Err(invalid());
    }

    Ok(strip_one_leading(rest).to_string())
}

/// Local path relative to a local root
pub fn local_relative(path: &Path, root: &Path) -> Result<String> {
    to_relative(&path_to_slash(path), &path_to_slash(root))
}

/// Join an object root and a relative path into a store key.
///
/// Runs of `/` are collapsed; an empty object root yields the relative
/// path itself.
pub fn to_remote_key(relative_path: &str, object_root: &str) -> String {
    let joined = if object_root.is_empty() {
        normalize_separators(relative_path)
    } else {
        format!("{}/{}", normalize_separators(object_root), normalize_separators(relative_path))
    };
    collapse_separators(&joined)
}

/// Canonical object root: single separators, no leading or trailing `/`
pub fn normalize_object_root(object_root: &str) -> String {
    collapse_separators(&normalize_separators(object_root))
        .trim_matches('/')
        .to_string()
}

/// Store key relative to an object root
pub fn key_to_relative(key: &str, object_root: &str) -> Result<String> {
    to_relative(&collapse_separators(key), &collapse_separators(object_root))
}

fn strip_one_leading(s: &str) -> &str {
    s.strip_prefix('/').unwrap_or(s)
}

fn collapse_separators(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_slash = false;
    for c in s.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}

// Tests live in tests/path_tests.rs
