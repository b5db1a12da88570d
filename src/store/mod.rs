//! Content-addressable directory snapshots
//!
//! A snapshot captures the complete file state of a directory into a
//! project-scoped object database and can be restored into the primary
//! workspace or any other worktree. The trait keeps the backing engine
//! swappable; the shipped implementation drives `git` plumbing as a
//! subprocess (see [`GitStore`]).

pub mod git;

pub use git::GitStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Content-addressed identifier for a complete directory-tree state.
/// Equal content yields an equal identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of files that differ from a snapshot, used to scope partial
/// reverts back to that snapshot's content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilePatch {
    /// Snapshot the files are measured against
    pub snapshot: Snapshot,

    /// Changed paths, relative to the workspace root
    pub files: Vec<String>,
}

/// Machine-readable per-file diff for preview UIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path relative to the workspace root
    pub file: String,

    /// Content on the `from` side; empty for added or binary files
    pub before: String,

    /// Content on the `to` side; empty for deleted or binary files
    pub after: String,

    pub additions: usize,
    pub deletions: usize,
}

/// Options for [`ContentStore::restore`] and [`ContentStore::restore_to`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Also remove files not present in the snapshot, forcing the target
    /// to match the snapshot exactly
    pub clean_untracked: bool,
}

/// Options for [`ContentStore::apply_patch`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    /// Fall back to a three-way merge using the object database
    pub three_way: bool,

    /// Apply the patch in reverse
    pub reverse: bool,
}

/// Errors from the snapshot store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error(transparent)]
    Repo(#[from] git2::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Snapshot operations over one tracked directory.
///
/// Restores return `Result` so callers with at-stake invariants (apply/undo)
/// can propagate failures; opportunistic call sites decide for themselves
/// whether to swallow them.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Capture the tracked directory's complete state.
    ///
    /// Returns `Ok(None)` when the directory is not under version control or
    /// snapshotting is disabled; that is "feature unavailable", not a fault.
    /// Idempotent: tracking twice with no changes yields the same snapshot.
    async fn track(&self) -> StoreResult<Option<Snapshot>>;

    /// Check out `snapshot` into the tracked directory
    async fn restore(&self, snapshot: &Snapshot, options: RestoreOptions) -> StoreResult<()>;

    /// Check out `snapshot` into an arbitrary directory
    async fn restore_to(
        &self,
        snapshot: &Snapshot,
        target: &Path,
        options: RestoreOptions,
    ) -> StoreResult<()>;

    /// Unified diff of the current directory state against `from`
    async fn diff(&self, from: &Snapshot) -> StoreResult<String>;

    /// Unified diff between two snapshots
    async fn diff_between(&self, a: &Snapshot, b: &Snapshot) -> StoreResult<String>;

    /// Per-file diffs between two snapshots
    async fn diff_full(&self, a: &Snapshot, b: &Snapshot) -> StoreResult<Vec<FileDiff>>;

    /// Per-file diffs of the current directory state against `from`
    async fn diff_files(&self, from: &Snapshot) -> StoreResult<Vec<FileDiff>>;

    /// Names of files changed since `snapshot`
    async fn patch(&self, snapshot: &Snapshot) -> StoreResult<FilePatch>;

    /// Restore each file named in `patches` to its owning patch's snapshot,
    /// deleting files absent there. Each file is processed once across the
    /// whole batch; the first patch naming it wins.
    async fn revert(&self, patches: &[FilePatch]) -> StoreResult<()>;

    /// Apply a textual unified diff to the tracked directory. A patch that
    /// does not apply is `Ok(false)`, not an error; the caller decides
    /// fatality.
    async fn apply_patch(&self, diff: &str, options: PatchOptions) -> StoreResult<bool>;

    /// Whether the tracked directory's own repository has uncommitted changes
    async fn is_workspace_dirty(&self) -> StoreResult<bool>;

    /// Scope a patch down to the named files
    fn filter_patch(&self, patch: &FilePatch, keep: &[String]) -> FilePatch {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        FilePatch {
            snapshot: patch.snapshot.clone(),
            files: patch
                .files
                .iter()
                .filter(|f| keep.contains(f.as_str()))
                .cloned()
                .collect(),
        }
    }
}
