//! Hash-based reconciliation.
//!
//! Turns a local and a remote inventory into the set of transfers that
//! make the non-authoritative side match. Pure: no I/O, and the result
//! depends only on inventory contents, never on iteration order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::sync::inventory::{LocalInventory, RemoteInventory};

/// Which side is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Local is authoritative: upload changes, delete remote extras.
    Push,
    /// Remote is authoritative: download changes, never delete locally.
    Pull,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Push => f.write_str("push"),
            SyncDirection::Pull => f.write_str("pull"),
        }
    }
}

/// Operations needed to reconcile two inventories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub direction: SyncDirection,
    pub to_upload: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
    pub to_download: BTreeSet<String>,
    /// Paths present on both sides with equal identity
    pub unchanged: usize,
}

impl Plan {
    pub fn empty(direction: SyncDirection) -> Self {
        Self {
            direction,
            to_upload: BTreeSet::new(),
            to_delete: BTreeSet::new(),
            to_download: BTreeSet::new(),
            unchanged: 0,
        }
    }

    /// Nothing to transfer or delete
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty() && self.to_download.is_empty()
    }

    /// Total number of operations
    pub fn len(&self) -> usize {
        self.to_upload.len() + self.to_delete.len() + self.to_download.len()
    }
}

/// Compute the plan that makes the non-authoritative side match.
///
/// Push: local paths missing remotely or with a different identity are
/// uploaded, remote paths missing locally are deleted. An empty local
/// inventory therefore deletes everything under the remote prefix.
///
/// Pull: remote paths missing locally or with a different identity are
/// downloaded. Nothing is deleted.
pub fn diff(local: &LocalInventory, remote: &RemoteInventory, direction: SyncDirection) -> Plan {
    let mut plan = Plan::empty(direction);

    match direction {
        SyncDirection::Push => {
            for entry in local.iter() {
                match remote.identity(&entry.relative_path) {
                    Some(identity) if *identity == entry.identity => plan.unchanged += 1,
                    _ => {
                        plan.to_upload.insert(entry.relative_path.clone());
                    }
                }
            }
            for path in remote.paths() {
                if !local.contains(path) {
                    plan.to_delete.insert(path.to_string());
                }
            }
        }
        SyncDirection::Pull => {
            for entry in remote.iter() {
                match local.identity(&entry.relative_path) {
                    Some(identity) if *identity == entry.identity => plan.unchanged += 1,
                    _ => {
                        plan.to_download.insert(entry.relative_path.clone());
                    }
                }
            }
        }
    }

    plan
}

// Property tests live in tests/reconcile_tests.rs
