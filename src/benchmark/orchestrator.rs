//! Benchmark orchestration
//!
//! One parent session coordinates N child sessions, each bound to one model
//! and one isolated worktree seeded from the base snapshot. `apply` switches
//! the live workspace to a child's results and `undo` returns to the
//! checkpoint taken by the first apply; switching between children first
//! snapshots the outgoing child so no work is dropped.
//!
//! Every mutating operation runs under the `benchmark.worktree` lock for its
//! entire duration. Interleaving two of these sequences could leave the
//! applied/checkpoint state pointing at a workspace that matches neither.

use super::{
    AppliedVariant, BenchmarkChild, BenchmarkChildSession, BenchmarkError, BenchmarkParent,
    BenchmarkResult, SessionBenchmarkState,
};
use crate::lock;
use crate::models::{ModelCatalog, ModelRef};
use crate::session::{Session, SessionStore};
use crate::store::{ContentStore, RestoreOptions, Snapshot};
use chrono::Utc;
use colored::Colorize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Children created when `start` is given neither models nor a count
pub const DEFAULT_CHILD_COUNT: usize = 2;

/// Options for [`SessionBenchmark::start`]
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Number of children when `models` is empty (default 2)
    pub count: Option<usize>,

    /// Explicit model list; one child per entry
    pub models: Vec<ModelRef>,

    /// Accept a repeated (provider, model) pair in the explicit list
    pub allow_duplicates: bool,
}

/// Request for [`SessionBenchmark::apply`]
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    /// A child session id, or a parent session id plus `target_session_id`
    pub session_id: String,

    pub target_session_id: Option<String>,

    /// Overwrite uncommitted manual edits in the workspace
    pub allow_dirty: bool,
}

/// Request for [`SessionBenchmark::undo`]
#[derive(Debug, Clone, Default)]
pub struct UndoRequest {
    /// Any session in the benchmark
    pub session_id: String,

    pub allow_dirty: bool,
}

/// Orchestrator for parent/child benchmark sessions
pub struct SessionBenchmark {
    store: Arc<dyn ContentStore>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn ModelCatalog>,
    data_root: PathBuf,
}

impl SessionBenchmark {
    pub fn new(
        store: Arc<dyn ContentStore>,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn ModelCatalog>,
        data_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            sessions,
            catalog,
            data_root: data_root.into(),
        }
    }

    fn benchmark_dir(&self, parent_id: &str) -> PathBuf {
        self.data_root.join("benchmark").join(parent_id)
    }

    fn base_worktree_dir(&self, parent_id: &str) -> PathBuf {
        self.benchmark_dir(parent_id).join("base")
    }

    fn child_worktree_dir(&self, parent_id: &str, child_id: &str) -> PathBuf {
        self.benchmark_dir(parent_id).join(child_id)
    }

    // =========================================================================
    // Resolution helpers
    // =========================================================================

    /// Parent session id for any session in a benchmark
    pub fn resolve_parent(&self, session_id: &str) -> BenchmarkResult<Option<String>> {
        let session = self.sessions.get(session_id)?;
        Ok(match session.benchmark {
            Some(SessionBenchmarkState::Parent(_)) => Some(session.id),
            Some(SessionBenchmarkState::Child(child)) => Some(child.parent_id),
            None => None,
        })
    }

    /// Resolve `(parent_id, child_id)` from a child session id, or from a
    /// parent session id plus an explicit target
    pub fn resolve_child(
        &self,
        session_id: &str,
        target_session_id: Option<&str>,
    ) -> BenchmarkResult<Option<(String, String)>> {
        let session = self.sessions.get(session_id)?;
        Ok(match session.benchmark {
            Some(SessionBenchmarkState::Child(child)) => Some((child.parent_id, session.id)),
            Some(SessionBenchmarkState::Parent(_)) => {
                target_session_id.map(|target| (session.id, target.to_string()))
            }
            None => None,
        })
    }

    pub fn is_parent(&self, session_id: &str) -> BenchmarkResult<bool> {
        Ok(matches!(
            self.sessions.get(session_id)?.benchmark,
            Some(SessionBenchmarkState::Parent(_))
        ))
    }

    pub fn is_child(&self, session_id: &str) -> BenchmarkResult<bool> {
        Ok(matches!(
            self.sessions.get(session_id)?.benchmark,
            Some(SessionBenchmarkState::Child(_))
        ))
    }

    /// The parent record for any session in a benchmark, with its parent id
    pub fn resolve_parent_record(
        &self,
        session_id: &str,
    ) -> BenchmarkResult<Option<(String, BenchmarkParent)>> {
        let Some(parent_id) = self.resolve_parent(session_id)? else {
            return Ok(None);
        };
        Ok(self.parent_record(&parent_id)?.map(|record| (parent_id, record)))
    }

    fn parent_record(&self, parent_id: &str) -> BenchmarkResult<Option<BenchmarkParent>> {
        Ok(match self.sessions.get(parent_id)?.benchmark {
            Some(SessionBenchmarkState::Parent(record)) => Some(record),
            _ => None,
        })
    }

    fn persist_parent(&self, parent_id: &str, record: &BenchmarkParent) -> BenchmarkResult<()> {
        self.sessions.update(parent_id, &mut |session| {
            session.benchmark = Some(SessionBenchmarkState::Parent(record.clone()));
        })?;
        Ok(())
    }

    /// Record a child's newest snapshot on both sides of the denormalized pair
    fn record_child_snapshot(
        &self,
        record: &mut BenchmarkParent,
        child_id: &str,
        snapshot: &Snapshot,
    ) -> BenchmarkResult<()> {
        if let Some(child) = record.child_mut(child_id) {
            child.last_snapshot = Some(snapshot.clone());
        }
        self.sessions.update(child_id, &mut |session| {
            if let Some(SessionBenchmarkState::Child(child)) = &mut session.benchmark {
                child.last_snapshot = Some(snapshot.clone());
            }
        })?;
        Ok(())
    }

    // =========================================================================
    // start / stop
    // =========================================================================

    /// Start a benchmark on `parent_id`, creating one child session and
    /// worktree per model. An already-active benchmark on the session (or on
    /// the parent of it, if it is a child) is stopped first.
    pub async fn start(
        &self,
        parent_id: &str,
        options: StartOptions,
    ) -> BenchmarkResult<BenchmarkParent> {
        let _guard = lock::acquire(lock::WORKTREE_LOCK).await;
        self.start_locked(parent_id, options).await
    }

    async fn start_locked(
        &self,
        parent_id: &str,
        options: StartOptions,
    ) -> BenchmarkResult<BenchmarkParent> {
        if let Some(active) = self.resolve_parent(parent_id)? {
            eprintln!(
                "{}",
                format!(
                    "Stopping existing benchmark on {} before starting a new one",
                    active
                )
                .yellow()
            );
            self.stop_locked(&active)?;
        }

        let parent_session = self.sessions.get(parent_id)?;
        if !options.allow_duplicates {
            let duplicates = duplicate_models(&options.models);
            if !duplicates.is_empty() {
                return Err(BenchmarkError::DuplicateModels { models: duplicates });
            }
        }
        let models = self.resolve_models(&parent_session, &options)?;

        let base_snapshot =
            self.store.track().await?.ok_or_else(|| BenchmarkError::SnapshotUnavailable {
                message: "benchmarking requires a version-controlled workspace with snapshots enabled"
                    .to_string(),
            })?;

        let base_worktree = self.base_worktree_dir(parent_id);
        std::fs::create_dir_all(&base_worktree)?;
        self.store
            .restore_to(&base_snapshot, &base_worktree, RestoreOptions { clean_untracked: true })
            .await?;

        let mut children = Vec::with_capacity(models.len());
        for model in models {
            let mut child_session = Session::new();
            child_session.parent_id = Some(parent_id.to_string());
            child_session.title = Some(format!("variant {}", model));
            child_session.model = Some(model.clone());
            let child_session = self.sessions.create(child_session)?;

            let worktree = self.child_worktree_dir(parent_id, &child_session.id);
            std::fs::create_dir_all(&worktree)?;
            self.store
                .restore_to(&base_snapshot, &worktree, RestoreOptions { clean_untracked: true })
                .await?;

            let mirror = BenchmarkChildSession {
                parent_id: parent_id.to_string(),
                model: model.clone(),
                worktree: Some(worktree.clone()),
                last_snapshot: None,
                error: None,
            };
            self.sessions.update(&child_session.id, &mut |session| {
                session.benchmark = Some(SessionBenchmarkState::Child(mirror.clone()));
            })?;

            children.push(BenchmarkChild {
                session_id: child_session.id,
                model,
                worktree: Some(worktree),
                last_snapshot: None,
                error: None,
            });
        }

        let record = BenchmarkParent {
            enabled: true,
            created_at: Utc::now(),
            base_snapshot,
            base_worktree,
            children,
            applied: AppliedVariant::None,
        };
        self.persist_parent(parent_id, &record)?;
        Ok(record)
    }

    /// Stop the benchmark any of its sessions belongs to: clear the
    /// benchmark field everywhere, then best-effort delete the worktrees
    pub async fn stop(&self, session_id: &str) -> BenchmarkResult<()> {
        let _guard = lock::acquire(lock::WORKTREE_LOCK).await;
        self.stop_locked(session_id)
    }

    fn stop_locked(&self, session_id: &str) -> BenchmarkResult<()> {
        let Some(parent_id) = self.resolve_parent(session_id)? else {
            return Ok(());
        };

        if let Some(record) = self.parent_record(&parent_id)? {
            for child in &record.children {
                if let Err(err) = self
                    .sessions
                    .update(&child.session_id, &mut |session| session.benchmark = None)
                {
                    eprintln!(
                        "{}",
                        format!(
                            "Warning: failed to clear benchmark state on {}: {}",
                            child.session_id, err
                        )
                        .yellow()
                    );
                }
            }
        }
        self.sessions
            .update(&parent_id, &mut |session| session.benchmark = None)?;

        // Cleanup failure leaves orphaned files, not corrupt state.
        let dir = self.benchmark_dir(&parent_id);
        if dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                eprintln!(
                    "{}",
                    format!(
                        "Warning: failed to remove benchmark worktrees at {}: {}",
                        dir.display(),
                        err
                    )
                    .yellow()
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // apply / undo
    // =========================================================================

    /// Switch the live workspace to one child's results
    pub async fn apply(&self, request: ApplyRequest) -> BenchmarkResult<()> {
        let _guard = lock::acquire(lock::WORKTREE_LOCK).await;
        self.apply_locked(request).await
    }

    async fn apply_locked(&self, request: ApplyRequest) -> BenchmarkResult<()> {
        let Some((parent_id, child_id)) = self
            .resolve_child(&request.session_id, request.target_session_id.as_deref())?
        else {
            return Ok(());
        };
        let Some(mut record) = self.parent_record(&parent_id)? else {
            return Ok(());
        };
        if !record.enabled || record.child(&child_id).is_none() {
            return Ok(());
        }

        if !request.allow_dirty {
            self.assert_workspace_clean().await?;
        }

        let target_snapshot = self.latest_snapshot(&child_id)?.ok_or_else(|| {
            BenchmarkError::SnapshotUnavailable {
                message: format!("variant {} has not produced a snapshot yet", child_id),
            }
        })?;

        let current =
            self.store.track().await?.ok_or_else(|| BenchmarkError::SnapshotUnavailable {
                message: "could not checkpoint the workspace before applying".to_string(),
            })?;

        // Switching away from another child: bank the outgoing state first.
        if let AppliedVariant::Applied { session_id: outgoing, .. } = record.applied.clone() {
            if outgoing != child_id {
                self.record_child_snapshot(&mut record, &outgoing, &current)?;
                self.persist_parent(&parent_id, &record)?;
                self.sync_child_worktree(&parent_id, &mut record, &outgoing, &current)
                    .await;
            }
        }

        self.store
            .restore(&target_snapshot, RestoreOptions { clean_untracked: true })
            .await?;

        // The checkpoint anchors the undo baseline: captured by the first
        // apply of a switching session, reused by every later switch.
        record.applied = match record.applied {
            AppliedVariant::None => AppliedVariant::Applied {
                session_id: child_id.clone(),
                checkpoint: current,
            },
            AppliedVariant::Applied { checkpoint, .. } => AppliedVariant::Applied {
                session_id: child_id.clone(),
                checkpoint,
            },
        };
        self.persist_parent(&parent_id, &record)?;
        Ok(())
    }

    /// Restore the workspace to the checkpoint taken before the first apply
    pub async fn undo(&self, request: UndoRequest) -> BenchmarkResult<()> {
        let _guard = lock::acquire(lock::WORKTREE_LOCK).await;
        self.undo_locked(request).await
    }

    async fn undo_locked(&self, request: UndoRequest) -> BenchmarkResult<()> {
        let Some(parent_id) = self.resolve_parent(&request.session_id)? else {
            return Ok(());
        };
        let Some(mut record) = self.parent_record(&parent_id)? else {
            return Ok(());
        };
        let AppliedVariant::Applied { session_id: applied_id, checkpoint } =
            record.applied.clone()
        else {
            return Ok(());
        };

        if !request.allow_dirty {
            self.assert_workspace_clean().await?;
        }

        let current =
            self.store.track().await?.ok_or_else(|| BenchmarkError::SnapshotUnavailable {
                message: "could not capture the applied variant's state before undoing"
                    .to_string(),
            })?;
        self.record_child_snapshot(&mut record, &applied_id, &current)?;
        self.sync_child_worktree(&parent_id, &mut record, &applied_id, &current)
            .await;

        self.store
            .restore(&checkpoint, RestoreOptions { clean_untracked: true })
            .await?;

        record.applied = AppliedVariant::None;
        self.persist_parent(&parent_id, &record)?;
        Ok(())
    }

    // =========================================================================
    // Lazy materialization & progress
    // =========================================================================

    /// The immutable snapshot the benchmark started from
    pub fn ensure_base_snapshot(&self, session_id: &str) -> BenchmarkResult<Snapshot> {
        match self.resolve_parent_record(session_id)? {
            Some((_, record)) => Ok(record.base_snapshot),
            None => Err(BenchmarkError::SnapshotUnavailable {
                message: format!("session {} is not part of a benchmark", session_id),
            }),
        }
    }

    /// Path of a child's worktree, recreating it from the base snapshot if
    /// it was deleted externally
    pub async fn ensure_child_worktree(&self, session_id: &str) -> BenchmarkResult<PathBuf> {
        let _guard = lock::acquire(lock::WORKTREE_LOCK).await;
        let Some((parent_id, child_id)) = self.resolve_child(session_id, None)? else {
            return Err(BenchmarkError::SnapshotUnavailable {
                message: format!("session {} is not a benchmark child", session_id),
            });
        };
        let Some(mut record) = self.parent_record(&parent_id)? else {
            return Err(BenchmarkError::SnapshotUnavailable {
                message: format!("no active benchmark for session {}", session_id),
            });
        };
        let path = self
            .ensure_child_worktree_in(&parent_id, &mut record, &child_id)
            .await?;
        self.persist_parent(&parent_id, &record)?;
        Ok(path)
    }

    async fn ensure_child_worktree_in(
        &self,
        parent_id: &str,
        record: &mut BenchmarkParent,
        child_id: &str,
    ) -> BenchmarkResult<PathBuf> {
        if let Some(path) = record.child(child_id).and_then(|c| c.worktree.clone()) {
            if path.exists() {
                return Ok(path);
            }
        }

        let dir = self.child_worktree_dir(parent_id, child_id);
        std::fs::create_dir_all(&dir)?;
        self.store
            .restore_to(&record.base_snapshot, &dir, RestoreOptions { clean_untracked: true })
            .await?;

        if let Some(child) = record.child_mut(child_id) {
            child.worktree = Some(dir.clone());
        }
        self.sessions.update(child_id, &mut |session| {
            if let Some(SessionBenchmarkState::Child(child)) = &mut session.benchmark {
                child.worktree = Some(dir.clone());
            }
        })?;
        Ok(dir)
    }

    /// Record a new snapshot of a child's work (called as a child's model
    /// finishes a step)
    pub async fn update_child_snapshot(
        &self,
        session_id: &str,
        snapshot: Snapshot,
    ) -> BenchmarkResult<()> {
        let _guard = lock::acquire(lock::WORKTREE_LOCK).await;
        let Some((parent_id, child_id)) = self.resolve_child(session_id, None)? else {
            return Ok(());
        };
        let Some(mut record) = self.parent_record(&parent_id)? else {
            return Ok(());
        };
        self.record_child_snapshot(&mut record, &child_id, &snapshot)?;
        self.persist_parent(&parent_id, &record)?;
        Ok(())
    }

    /// A child's newest snapshot: its recorded one, else the newest
    /// step-finished marker in its message history
    pub fn latest_snapshot(&self, child_id: &str) -> BenchmarkResult<Option<Snapshot>> {
        let session = self.sessions.get(child_id)?;
        if let Some(SessionBenchmarkState::Child(child)) = &session.benchmark {
            if let Some(snapshot) = &child.last_snapshot {
                return Ok(Some(snapshot.clone()));
            }
        }
        let messages = self.sessions.list_messages(child_id)?;
        Ok(messages.iter().rev().find_map(|m| m.snapshot.clone()))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn resolve_models(
        &self,
        parent: &Session,
        options: &StartOptions,
    ) -> BenchmarkResult<Vec<ModelRef>> {
        if !options.models.is_empty() {
            return Ok(options.models.clone());
        }
        let model = parent
            .model
            .clone()
            .or_else(|| self.catalog.default_model())
            .ok_or(BenchmarkError::ModelUnavailable)?;
        let count = options.count.unwrap_or(DEFAULT_CHILD_COUNT);
        Ok(vec![model; count])
    }

    async fn assert_workspace_clean(&self) -> BenchmarkResult<()> {
        if self.store.is_workspace_dirty().await? {
            return Err(BenchmarkError::WorkingTreeDirty {
                message: "the workspace has uncommitted changes that this restore would overwrite"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Opportunistically refresh a child's worktree to `snapshot`. The
    /// snapshot is already persisted on the child record, so a failure here
    /// only leaves the worktree stale.
    async fn sync_child_worktree(
        &self,
        parent_id: &str,
        record: &mut BenchmarkParent,
        child_id: &str,
        snapshot: &Snapshot,
    ) {
        let result = match self
            .ensure_child_worktree_in(parent_id, record, child_id)
            .await
        {
            Ok(worktree) => {
                self.store
                    .restore_to(snapshot, &worktree, RestoreOptions { clean_untracked: true })
                    .await
                    .map_err(BenchmarkError::from)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            eprintln!(
                "{}",
                format!("Warning: failed to refresh worktree for {}: {}", child_id, err)
                    .yellow()
            );
        }
    }
}

/// Models that repeat in the list, order-independent
fn duplicate_models(models: &[ModelRef]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for model in models {
        if !seen.insert((model.provider_id.as_str(), model.model_id.as_str())) {
            let name = model.to_string();
            if !duplicates.contains(&name) {
                duplicates.push(name);
            }
        }
    }
    duplicates
}
