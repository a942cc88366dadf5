//! Directory exclusion for local walks.
//!
//! Each configured tag is matched against the base name of a directory;
//! a matching directory is skipped together with everything below it.
//! Tags are globs, so `node_modules` matches exactly and `*.cache` matches
//! any directory with that suffix.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Result, SyncError};

/// Compiled set of excluded directory names.
#[derive(Debug, Clone)]
pub struct ExcludeDirs {
    /// Compiled glob set for matching.
    glob_set: GlobSet,
    /// Raw pattern strings (for display/serialization).
    patterns: Vec<String>,
}

impl Default for ExcludeDirs {
    fn default() -> Self {
        Self::new()
    }
}

impl ExcludeDirs {
    /// Create a set that excludes nothing.
    pub fn new() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Create from a list of directory names or name globs.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_list = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim().trim_end_matches(['/', '\\']);
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(pattern).map_err(|e| {
                SyncError::config(format!("invalid exclude tag '{}': {}", pattern, e))
            })?;
            builder.add(glob);
            pattern_list.push(pattern.to_string());
        }

        let glob_set = builder
            .build()
            .map_err(|e| SyncError::config(format!("invalid exclude tags: {}", e)))?;

        Ok(Self {
            glob_set,
            patterns: pattern_list,
        })
    }

    /// Check whether a directory with this base name is skipped.
    pub fn is_excluded(&self, dir_name: &str) -> bool {
        !self.patterns.is_empty() && self.glob_set.is_match(dir_name)
    }

    /// Get the list of patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
