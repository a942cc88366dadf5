//! Sync module
//!
//! Inventories, reconciliation and plan execution for push and pull runs.

pub mod engine;
pub mod exclude;
pub mod executor;
pub mod inventory;
pub mod reconcile;
pub mod transfer;

pub use engine::{PullTarget, PushTarget, RunReport, RunState, SyncEngine, SyncOptions, SyncStats};
pub use exclude::ExcludeDirs;
pub use executor::{Executor, ItemAction, ItemOutcome, DEFAULT_CONCURRENCY};
pub use inventory::{
    build_local, build_local_many, build_remote, probe_local, Inventory, InventoryEntry, LocalInventory,
    Origin, RemoteInventory,
};
pub use reconcile::{diff, Plan, SyncDirection};
pub use transfer::{HandleState, Transfer, UploadHandle, Uploader};
