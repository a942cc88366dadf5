//! Sync engine: drives one run from collection to a terminal state.
//!
//! A run moves through `Collecting -> Planning -> Executing` and ends in
//! `Completed` or `Aborted`. Failures while collecting or planning abort
//! with nothing written anywhere. The engine never prints; everything the
//! caller needs is in the returned [`RunReport`].

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::fs::{FileSystem, ObjectStore};
use crate::hash;
use crate::sync::exclude::ExcludeDirs;
use crate::sync::executor::{Executor, ItemAction, ItemOutcome, DEFAULT_CONCURRENCY};
use crate::sync::inventory::{self, LocalInventory, RemoteInventory};
use crate::sync::reconcile::{self, Plan, SyncDirection};

/// Run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Collecting,
    Planning,
    Executing,
    /// Every item was attempted; individual failures are in the outcomes.
    Completed,
    /// Stopped early; see the report error.
    Aborted,
}

/// Run options shared by both directions.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Item operations in flight during execution.
    pub concurrency: usize,
    /// Compute and report the plan without executing it.
    pub dry_run: bool,
    /// Abort a push whose plan deletes more objects than this.
    pub max_deletes: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            max_deletes: None,
        }
    }
}

/// What a push run reads and where it writes.
#[derive(Debug, Clone)]
pub struct PushTarget {
    pub upload_roots: Vec<PathBuf>,
    pub exclude: ExcludeDirs,
    pub object_root: String,
}

/// What a pull run reads and where it writes.
#[derive(Debug, Clone)]
pub struct PullTarget {
    pub download_root: PathBuf,
    pub object_root: String,
}

/// Sync statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    /// Files in the local inventory.
    pub local_files: usize,
    /// Objects in the remote inventory.
    pub remote_objects: usize,
    pub uploaded: usize,
    pub deleted: usize,
    pub downloaded: usize,
    /// Paths already identical on both sides.
    pub unchanged: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    pub duration_ms: u64,
}

/// Result of a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub direction: SyncDirection,
    pub state: RunState,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub plan: Option<Plan>,
    pub outcomes: Vec<ItemOutcome>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SyncError>,
    /// Phase the run was in when it aborted.
    pub aborted_in: Option<RunState>,
    pub stats: SyncStats,
}

impl RunReport {
    fn new(direction: SyncDirection, dry_run: bool) -> Self {
        Self {
            direction,
            state: RunState::Collecting,
            dry_run,
            started_at: Utc::now(),
            plan: None,
            outcomes: Vec::new(),
            error: None,
            aborted_in: None,
            stats: SyncStats::default(),
        }
    }

    /// The run reached `Completed`
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Any attempted item failed
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    fn enter(&mut self, state: RunState) {
        debug!(direction = %self.direction, from = ?self.state, to = ?state, "run state");
        self.state = state;
    }

    fn abort(mut self, error: SyncError, started: Instant) -> Self {
        warn!(direction = %self.direction, phase = ?self.state, error = %error, "run aborted");
        self.aborted_in = Some(self.state);
        self.state = RunState::Aborted;
        self.error = Some(error);
        self.finish_stats(started);
        self
    }

    fn complete(mut self, started: Instant) -> Self {
        self.state = RunState::Completed;
        self.finish_stats(started);
        info!(
            direction = %self.direction,
            uploaded = self.stats.uploaded,
            deleted = self.stats.deleted,
            downloaded = self.stats.downloaded,
            failed = self.stats.failed,
            "run completed"
        );
        self
    }

    fn finish_stats(&mut self, started: Instant) {
        let stats = &mut self.stats;
        for outcome in &self.outcomes {
            if !outcome.is_ok() {
                stats.failed += 1;
                continue;
            }
            stats.bytes_transferred += outcome.bytes;
            match outcome.action {
                ItemAction::Upload => stats.uploaded += 1,
                ItemAction::Delete => stats.deleted += 1,
                ItemAction::Download => stats.downloaded += 1,
            }
        }
        stats.duration_ms = started.elapsed().as_millis() as u64;
    }
}

fn serialize_error<S>(error: &Option<SyncError>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Sync engine for orchestrating sync runs.
pub struct SyncEngine {
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn ObjectStore>,
    options: SyncOptions,
    events: Option<mpsc::UnboundedSender<ItemOutcome>>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(fs: Arc<dyn FileSystem>, store: Arc<dyn ObjectStore>, options: SyncOptions) -> Self {
        Self {
            fs,
            store,
            options,
            events: None,
        }
    }

    /// Create a sync engine that streams item outcomes as they happen.
    ///
    /// Sends never wait on the receiver, so an undrained channel cannot stall a run.
    pub fn with_events(
        fs: Arc<dyn FileSystem>,
        store: Arc<dyn ObjectStore>,
        options: SyncOptions,
        events: mpsc::UnboundedSender<ItemOutcome>,
    ) -> Self {
        let mut engine = Self::new(fs, store, options);
        engine.events = Some(events);
        engine
    }

    fn executor(&self) -> Executor {
        let executor = Executor::new(Arc::clone(&self.fs), Arc::clone(&self.store))
            .with_concurrency(self.options.concurrency);
        match self.events {
            Some(ref tx) => executor.with_events(tx.clone()),
            None => executor,
        }
    }

    /// Collect both inventories and plan a push, without side effects.
    pub async fn plan_push(&self, target: &PushTarget) -> Result<(Plan, LocalInventory, RemoteInventory)> {
        let (local, remote) = self.collect_push(target).await?;
        let plan = self.plan_push_from(&local, &remote)?;
        Ok((plan, local, remote))
    }

    /// Collect the remote inventory and the matching local files, then plan a pull.
    pub async fn plan_pull(&self, target: &PullTarget) -> Result<(Plan, LocalInventory, RemoteInventory)> {
        let (local, remote) = self.collect_pull(target).await?;
        let plan = reconcile::diff(&local, &remote, SyncDirection::Pull);
        Ok((plan, local, remote))
    }

    async fn collect_push(&self, target: &PushTarget) -> Result<(LocalInventory, RemoteInventory)> {
        let object_root = hash::normalize_object_root(&target.object_root);
        let remote = inventory::build_remote(&*self.store, &object_root).await?;
        let local = inventory::build_local_many(
            &*self.fs,
            &target.upload_roots,
            &target.exclude,
            self.store.identity_scheme(),
        )
        .await?;
        Ok((local, remote))
    }

    async fn collect_pull(&self, target: &PullTarget) -> Result<(LocalInventory, RemoteInventory)> {
        let object_root = hash::normalize_object_root(&target.object_root);
        let remote = inventory::build_remote(&*self.store, &object_root).await?;
        let local = inventory::probe_local(
            &*self.fs,
            &target.download_root,
            remote.paths(),
            self.store.identity_scheme(),
        )
        .await;
        Ok((local, remote))
    }

    /// Diff a push and apply the delete guard.
    fn plan_push_from(&self, local: &LocalInventory, remote: &RemoteInventory) -> Result<Plan> {
        let plan = reconcile::diff(local, remote, SyncDirection::Push);
        if local.is_empty() && !plan.to_delete.is_empty() {
            warn!(
                deletions = plan.to_delete.len(),
                "no local files found, every remote object under the prefix will be deleted"
            );
        }
        if let Some(limit) = self.options.max_deletes {
            if plan.to_delete.len() > limit {
                return Err(SyncError::Guard {
                    deletions: plan.to_delete.len(),
                    threshold: limit,
                });
            }
        }
        Ok(plan)
    }

    /// Make the remote prefix match the local roots.
    pub async fn push(&self, target: &PushTarget) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(SyncDirection::Push, self.options.dry_run);
        let object_root = hash::normalize_object_root(&target.object_root);
        info!(
            backend = self.store.backend_type().short_name(),
            prefix = %self.store.display_key(&object_root),
            roots = target.upload_roots.len(),
            "push started"
        );

        let (local, remote) = match self.collect_push(target).await {
            Ok(collected) => collected,
            Err(e) => return report.abort(e, started),
        };
        report.enter(RunState::Planning);
        let plan = match self.plan_push_from(&local, &remote) {
            Ok(plan) => plan,
            Err(e) => return report.abort(e, started),
        };
        record_plan(&mut report, &plan, &local, &remote);

        if self.options.dry_run {
            return report.complete(started);
        }

        report.enter(RunState::Executing);
        let result = self
            .executor()
            .execute_push(&plan, &local, &remote, &object_root)
            .await;
        match result {
            Ok(outcomes) => {
                report.outcomes = outcomes;
                report.complete(started)
            }
            Err(e) => report.abort(e, started),
        }
    }

    /// Bring remote objects that are missing or changed locally into the download root.
    pub async fn pull(&self, target: &PullTarget) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(SyncDirection::Pull, self.options.dry_run);
        let object_root = hash::normalize_object_root(&target.object_root);
        info!(
            backend = self.store.backend_type().short_name(),
            prefix = %self.store.display_key(&object_root),
            download_root = %target.download_root.display(),
            "pull started"
        );

        let (local, remote) = match self.collect_pull(target).await {
            Ok(collected) => collected,
            Err(e) => return report.abort(e, started),
        };
        report.enter(RunState::Planning);
        let plan = reconcile::diff(&local, &remote, SyncDirection::Pull);
        record_plan(&mut report, &plan, &local, &remote);

        if self.options.dry_run {
            return report.complete(started);
        }

        report.enter(RunState::Executing);
        let (outcomes, error) = self
            .executor()
            .execute_pull(&plan, &remote, &target.download_root, &object_root)
            .await;
        report.outcomes = outcomes;
        match error {
            Some(e) => report.abort(e, started),
            None => report.complete(started),
        }
    }
}

fn record_plan(report: &mut RunReport, plan: &Plan, local: &LocalInventory, remote: &RemoteInventory) {
    report.stats.local_files = local.len();
    report.stats.remote_objects = remote.len();
    report.stats.unchanged = plan.unchanged;
    info!(
        direction = %plan.direction,
        upload = plan.to_upload.len(),
        delete = plan.to_delete.len(),
        download = plan.to_download.len(),
        unchanged = plan.unchanged,
        "plan computed"
    );
    report.plan = Some(plan.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_options_defaults() {
        let options = SyncOptions::default();

        assert_eq!(options.concurrency, DEFAULT_CONCURRENCY);
        assert!(!options.dry_run);
        assert!(options.max_deletes.is_none());
    }

    #[test]
    fn test_report_stats_from_outcomes() {
        let mut report = RunReport::new(SyncDirection::Push, false);
        report.outcomes = vec![
            ItemOutcome {
                action: ItemAction::Upload,
                path: "a".to_string(),
                key: "r/a".to_string(),
                bytes: 10,
                error: None,
            },
            ItemOutcome {
                action: ItemAction::Delete,
                path: "b".to_string(),
                key: "r/b".to_string(),
                bytes: 0,
                error: Some("denied".to_string()),
            },
        ];

        let report = report.complete(Instant::now());
        assert!(report.is_success());
        assert!(report.has_failures());
        assert_eq!(report.stats.uploaded, 1);
        assert_eq!(report.stats.deleted, 0);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.bytes_transferred, 10);
    }

    #[test]
    fn test_report_serializes_error_as_text() {
        let report = RunReport::new(SyncDirection::Pull, true).abort(
            SyncError::config("missing Bucket"),
            Instant::now(),
        );
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["state"], "aborted");
        assert_eq!(json["aborted_in"], "collecting");
        assert_eq!(json["direction"], "pull");
        assert_eq!(json["error"], "Configuration error: missing Bucket");
    }
}
