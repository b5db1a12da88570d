//! Named exclusive locks
//!
//! Every workspace-mutating benchmark operation runs under a single named
//! lock held for the operation's entire duration, so an `apply` and a
//! concurrent `undo`/`apply` can never interleave their snapshot/restore
//! steps. Guards release on drop, on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Lock serializing every operation that mutates worktrees or the workspace
pub const WORKTREE_LOCK: &str = "benchmark.worktree";

/// Guard for a named lock; the lock is held until the guard is dropped
pub type LockGuard = tokio::sync::OwnedMutexGuard<()>;

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> = OnceLock::new();

/// Acquire the named lock, waiting until it is free
pub async fn acquire(name: &str) -> LockGuard {
    let slot = {
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    };
    slot.lock_owned().await
}
