//! Multi-model benchmark state
//!
//! A benchmark is a parent session coordinating N child sessions, each bound
//! to one model and one isolated worktree. The parent holds the full record;
//! each child session carries a mirror of its own facts so either side
//! resolves the other in one lookup.

pub mod orchestrator;

pub use orchestrator::{ApplyRequest, SessionBenchmark, StartOptions, UndoRequest};

use crate::models::ModelRef;
use crate::session::SessionError;
use crate::store::{Snapshot, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which variant currently owns the live workspace.
///
/// The checkpoint is the pre-apply baseline of the workspace and exists
/// exactly as long as a variant is applied; making the pair one state keeps
/// that invariant structural instead of a convention every call site must
/// remember.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AppliedVariant {
    #[default]
    None,
    Applied {
        /// The child whose results are in the live workspace
        session_id: String,
        /// Workspace state captured by the first apply of this switching
        /// session; `undo` restores it
        checkpoint: Snapshot,
    },
}

impl AppliedVariant {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            AppliedVariant::None => None,
            AppliedVariant::Applied { session_id, .. } => Some(session_id),
        }
    }

    pub fn checkpoint(&self) -> Option<&Snapshot> {
        match self {
            AppliedVariant::None => None,
            AppliedVariant::Applied { checkpoint, .. } => Some(checkpoint),
        }
    }
}

/// Benchmark record attached to the parent session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkParent {
    pub enabled: bool,
    pub created_at: DateTime<Utc>,

    /// Workspace state the benchmark started from; immutable for its lifetime
    pub base_snapshot: Snapshot,

    /// Checked-out copy of `base_snapshot`, kept for previews and re-seeding
    pub base_worktree: PathBuf,

    pub children: Vec<BenchmarkChild>,

    #[serde(default)]
    pub applied: AppliedVariant,
}

impl BenchmarkParent {
    pub fn child(&self, session_id: &str) -> Option<&BenchmarkChild> {
        self.children.iter().find(|c| c.session_id == session_id)
    }

    pub fn child_mut(&mut self, session_id: &str) -> Option<&mut BenchmarkChild> {
        self.children.iter_mut().find(|c| c.session_id == session_id)
    }
}

/// Denormalized per-variant entry held on the parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkChild {
    pub session_id: String,
    pub model: ModelRef,

    /// Lazily materialized; always re-creatable from the base snapshot
    #[serde(default)]
    pub worktree: Option<PathBuf>,

    /// Newest snapshot of this variant's work
    #[serde(default)]
    pub last_snapshot: Option<Snapshot>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Mirror of the child facts, attached to the child session itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkChildSession {
    pub parent_id: String,
    pub model: ModelRef,

    #[serde(default)]
    pub worktree: Option<PathBuf>,

    #[serde(default)]
    pub last_snapshot: Option<Snapshot>,

    #[serde(default)]
    pub error: Option<String>,
}

/// A session's role in a benchmark, as stored on the session record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionBenchmarkState {
    Parent(BenchmarkParent),
    Child(BenchmarkChildSession),
}

/// Errors from benchmark orchestration
#[derive(Debug, thiserror::Error)]
pub enum BenchmarkError {
    #[error("duplicate models in benchmark: {}", .models.join(", "))]
    DuplicateModels { models: Vec<String> },

    #[error("snapshot unavailable: {message}")]
    SnapshotUnavailable { message: String },

    #[error("working tree is dirty: {message}")]
    WorkingTreeDirty { message: String },

    #[error("no model to benchmark; pass models explicitly or configure a default")]
    ModelUnavailable,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BenchmarkResult<T> = Result<T, BenchmarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_variant_serializes_with_state_tag() {
        let applied = AppliedVariant::Applied {
            session_id: "child-1".to_string(),
            checkpoint: Snapshot::new("abc123"),
        };
        let json = serde_json::to_value(&applied).unwrap();
        assert_eq!(json["state"], "applied");
        assert_eq!(json["session_id"], "child-1");
        assert_eq!(json["checkpoint"], "abc123");

        let none = serde_json::to_value(AppliedVariant::None).unwrap();
        assert_eq!(none["state"], "none");
    }

    #[test]
    fn test_applied_without_checkpoint_fails_to_decode() {
        // The invariant "checkpoint present iff applied" is structural: a
        // record claiming an applied child without a checkpoint is invalid.
        let result: Result<AppliedVariant, _> =
            serde_json::from_str(r#"{"state":"applied","session_id":"child-1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_applied_variant_is_none() {
        assert_eq!(AppliedVariant::default(), AppliedVariant::None);
        assert!(AppliedVariant::None.session_id().is_none());
        assert!(AppliedVariant::None.checkpoint().is_none());
    }
}
