//! Integration tests for the benchmark flow
//!
//! Exercises the full parent/child lifecycle against real git repositories
//! in temp directories:
//! - start/stop topology and worktree seeding
//! - apply/undo checkpoint discipline across variant switches
//! - dirty-workspace guard and duplicate-model rejection
//! - lazy worktree recreation

use benchd::benchmark::{
    ApplyRequest, BenchmarkError, SessionBenchmark, SessionBenchmarkState, StartOptions,
    UndoRequest,
};
use benchd::models::{ConfigCatalog, ModelRef};
use benchd::session::{Message, MessageRole, Session, SessionStore};
use benchd::store::{ContentStore, GitStore, Snapshot};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git_in(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
}

fn init_repo(dir: &Path) {
    git_in(dir, &["init"]);
    git_in(dir, &["config", "user.email", "test@example.com"]);
    git_in(dir, &["config", "user.name", "Test User"]);
    fs::write(dir.join("README.md"), "# fixture\n").unwrap();
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();
    git_in(dir, &["add", "."]);
    git_in(dir, &["commit", "-m", "init"]);
}

struct Harness {
    _temp: TempDir,
    workspace: PathBuf,
    data_root: PathBuf,
    store: Arc<GitStore>,
    sessions: Arc<JsonStore>,
    bench: SessionBenchmark,
}

type JsonStore = benchd::session::JsonSessionStore;

fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("repo");
    fs::create_dir_all(&workspace).unwrap();
    init_repo(&workspace);

    let data_root = temp.path().join("data");
    let store = Arc::new(GitStore::open(&workspace, &data_root, true).unwrap());
    let sessions = Arc::new(JsonStore::open(&data_root));
    let catalog = Arc::new(ConfigCatalog::new(Some(ModelRef::new(
        "anthropic",
        "claude-sonnet-4",
    ))));
    let bench = SessionBenchmark::new(store.clone(), sessions.clone(), catalog, &data_root);

    Harness {
        workspace,
        data_root,
        store,
        sessions,
        bench,
        _temp: temp,
    }
}

fn create_parent(h: &Harness) -> Session {
    h.sessions.create(Session::with_id("parent")).unwrap()
}

/// Play the role of a child's model: edit its worktree, snapshot it, and
/// record the snapshot on the child
async fn simulate_child_work(h: &Harness, child_id: &str, file: &str, content: &str) -> Snapshot {
    let worktree = h.bench.ensure_child_worktree(child_id).await.unwrap();
    fs::write(worktree.join(file), content).unwrap();
    let snapshot = h
        .store
        .for_worktree(&worktree)
        .track()
        .await
        .unwrap()
        .unwrap();
    h.bench
        .update_child_snapshot(child_id, snapshot.clone())
        .await
        .unwrap();
    snapshot
}

#[tokio::test]
async fn test_start_with_count_creates_identical_children() {
    let h = harness();
    create_parent(&h);

    let record = h
        .bench
        .start(
            "parent",
            StartOptions {
                count: Some(3),
                ..StartOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(record.children.len(), 3);
    for child in &record.children {
        assert_eq!(child.model, ModelRef::new("anthropic", "claude-sonnet-4"));
        let worktree = child.worktree.as_ref().unwrap();
        assert_eq!(
            fs::read_to_string(worktree.join("README.md")).unwrap(),
            "# fixture\n"
        );
    }
}

#[tokio::test]
async fn test_start_prefers_parent_recent_model() {
    let h = harness();
    create_parent(&h);
    h.sessions
        .update("parent", &mut |s| {
            s.model = Some(ModelRef::new("openai", "gpt-5"))
        })
        .unwrap();

    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();

    assert_eq!(record.children.len(), 2);
    for child in &record.children {
        assert_eq!(child.model, ModelRef::new("openai", "gpt-5"));
    }
}

#[tokio::test]
async fn test_start_without_any_model_fails() {
    let h = harness();
    create_parent(&h);
    let bench = SessionBenchmark::new(
        h.store.clone(),
        h.sessions.clone(),
        Arc::new(ConfigCatalog::new(None)),
        &h.data_root,
    );

    let result = bench.start("parent", StartOptions::default()).await;
    assert!(matches!(result, Err(BenchmarkError::ModelUnavailable)));
}

#[tokio::test]
async fn test_duplicate_models_rejected_unless_allowed() {
    let h = harness();
    create_parent(&h);

    let models = vec![
        ModelRef::new("openai", "gpt-5"),
        ModelRef::new("openai", "gpt-5"),
    ];

    let rejected = h
        .bench
        .start(
            "parent",
            StartOptions {
                models: models.clone(),
                ..StartOptions::default()
            },
        )
        .await;
    match rejected {
        Err(BenchmarkError::DuplicateModels { models }) => {
            assert_eq!(models, vec!["openai/gpt-5"]);
        }
        other => panic!("expected DuplicateModels, got {:?}", other.map(|_| ())),
    }

    let record = h
        .bench
        .start(
            "parent",
            StartOptions {
                models,
                allow_duplicates: true,
                ..StartOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(record.children.len(), 2);
}

#[tokio::test]
async fn test_end_to_end_two_models() {
    let h = harness();
    create_parent(&h);

    let record = h
        .bench
        .start(
            "parent",
            StartOptions {
                models: vec![
                    ModelRef::new("anthropic", "claude-sonnet-4"),
                    ModelRef::new("openai", "gpt-5"),
                ],
                ..StartOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(record.children.len(), 2);
    assert!(h.bench.is_parent("parent").unwrap());

    for child in &record.children {
        assert!(h.bench.is_child(&child.session_id).unwrap());
        assert_eq!(
            h.bench.resolve_parent(&child.session_id).unwrap().as_deref(),
            Some("parent")
        );

        // The child session mirrors the benchmark facts with a "child" tag.
        let session = h.sessions.get(&child.session_id).unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["benchmark"]["type"], "child");

        // Each worktree holds exactly the baseline files.
        let worktree = child.worktree.as_ref().unwrap();
        assert_eq!(
            fs::read_to_string(worktree.join("README.md")).unwrap(),
            "# fixture\n"
        );
        assert_eq!(
            fs::read_to_string(worktree.join("src/main.rs")).unwrap(),
            "fn main() {}\n"
        );
    }
}

#[tokio::test]
async fn test_apply_then_undo_restores_pre_apply_state() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_id = record.children[0].session_id.clone();

    simulate_child_work(&h, &child_id, "feature.rs", "pub fn feature() {}\n").await;

    // Pre-apply state includes an uncommitted local file; the checkpoint
    // must carry it through apply and back out of undo.
    fs::write(h.workspace.join("notes.txt"), "local notes\n").unwrap();

    h.bench
        .apply(ApplyRequest {
            session_id: child_id.clone(),
            target_session_id: None,
            allow_dirty: true,
        })
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(h.workspace.join("feature.rs")).unwrap(),
        "pub fn feature() {}\n"
    );
    assert!(!h.workspace.join("notes.txt").exists());

    h.bench
        .undo(UndoRequest {
            session_id: "parent".to_string(),
            allow_dirty: true,
        })
        .await
        .unwrap();

    assert!(!h.workspace.join("feature.rs").exists());
    assert_eq!(
        fs::read_to_string(h.workspace.join("notes.txt")).unwrap(),
        "local notes\n"
    );
    assert_eq!(
        fs::read_to_string(h.workspace.join("README.md")).unwrap(),
        "# fixture\n"
    );
}

#[tokio::test]
async fn test_switching_variants_keeps_original_checkpoint() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_a = record.children[0].session_id.clone();
    let child_b = record.children[1].session_id.clone();

    simulate_child_work(&h, &child_a, "a.txt", "from a\n").await;
    simulate_child_work(&h, &child_b, "b.txt", "from b\n").await;

    h.bench
        .apply(ApplyRequest {
            session_id: child_a.clone(),
            target_session_id: None,
            allow_dirty: true,
        })
        .await
        .unwrap();
    let checkpoint_after_first = h
        .bench
        .resolve_parent_record("parent")
        .unwrap()
        .unwrap()
        .1
        .applied
        .checkpoint()
        .cloned();

    h.bench
        .apply(ApplyRequest {
            session_id: child_b.clone(),
            target_session_id: None,
            allow_dirty: true,
        })
        .await
        .unwrap();

    let (_, current) = h.bench.resolve_parent_record("parent").unwrap().unwrap();

    // The checkpoint anchors to the first apply; switching must not retake it.
    assert_eq!(current.applied.checkpoint().cloned(), checkpoint_after_first);
    assert_eq!(current.applied.session_id(), Some(child_b.as_str()));

    // Switching banked the outgoing variant's state.
    let child_a_record = current.child(&child_a).unwrap();
    assert!(child_a_record.last_snapshot.is_some());
    assert_eq!(
        fs::read_to_string(h.workspace.join("b.txt")).unwrap(),
        "from b\n"
    );
    assert!(!h.workspace.join("a.txt").exists());

    h.bench
        .undo(UndoRequest {
            session_id: "parent".to_string(),
            allow_dirty: true,
        })
        .await
        .unwrap();

    // Undo lands on the original baseline, not on variant A's state.
    assert!(!h.workspace.join("a.txt").exists());
    assert!(!h.workspace.join("b.txt").exists());
    assert_eq!(
        fs::read_to_string(h.workspace.join("README.md")).unwrap(),
        "# fixture\n"
    );
    let (_, after_undo) = h.bench.resolve_parent_record("parent").unwrap().unwrap();
    assert!(after_undo.applied.session_id().is_none());
}

#[tokio::test]
async fn test_apply_rejects_dirty_workspace() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_id = record.children[0].session_id.clone();
    simulate_child_work(&h, &child_id, "feature.rs", "pub fn feature() {}\n").await;

    fs::write(h.workspace.join("wip.txt"), "uncommitted\n").unwrap();

    let result = h
        .bench
        .apply(ApplyRequest {
            session_id: child_id.clone(),
            target_session_id: None,
            allow_dirty: false,
        })
        .await;
    assert!(matches!(
        result,
        Err(BenchmarkError::WorkingTreeDirty { .. })
    ));

    h.bench
        .apply(ApplyRequest {
            session_id: child_id,
            target_session_id: None,
            allow_dirty: true,
        })
        .await
        .unwrap();
    assert!(h.workspace.join("feature.rs").exists());
}

#[tokio::test]
async fn test_apply_falls_back_to_message_marker() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_id = record.children[0].session_id.clone();

    // The child produced work but never recorded a snapshot on its record;
    // only a step-finished message marker exists.
    let worktree = h.bench.ensure_child_worktree(&child_id).await.unwrap();
    fs::write(worktree.join("marker.txt"), "via message\n").unwrap();
    let snapshot = h
        .store
        .for_worktree(&worktree)
        .track()
        .await
        .unwrap()
        .unwrap();
    h.sessions
        .append_message(
            &child_id,
            Message::new(MessageRole::Assistant, "step finished").with_snapshot(snapshot),
        )
        .unwrap();

    h.bench
        .apply(ApplyRequest {
            session_id: child_id,
            target_session_id: None,
            allow_dirty: true,
        })
        .await
        .unwrap();
    assert_eq!(
        fs::read_to_string(h.workspace.join("marker.txt")).unwrap(),
        "via message\n"
    );
}

#[tokio::test]
async fn test_apply_without_any_snapshot_fails() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_id = record.children[0].session_id.clone();

    let result = h
        .bench
        .apply(ApplyRequest {
            session_id: child_id,
            target_session_id: None,
            allow_dirty: true,
        })
        .await;
    assert!(matches!(
        result,
        Err(BenchmarkError::SnapshotUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_apply_on_parent_without_target_is_a_noop() {
    let h = harness();
    create_parent(&h);
    h.bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();

    h.bench
        .apply(ApplyRequest {
            session_id: "parent".to_string(),
            target_session_id: None,
            allow_dirty: true,
        })
        .await
        .unwrap();
    assert_eq!(
        fs::read_to_string(h.workspace.join("README.md")).unwrap(),
        "# fixture\n"
    );
}

#[tokio::test]
async fn test_stop_clears_sessions_and_worktrees() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_ids: Vec<String> = record
        .children
        .iter()
        .map(|c| c.session_id.clone())
        .collect();
    let benchmark_dir = h.data_root.join("benchmark").join("parent");
    assert!(benchmark_dir.exists());

    h.bench.stop(&child_ids[0]).await.unwrap();

    assert!(h.sessions.get("parent").unwrap().benchmark.is_none());
    for child_id in &child_ids {
        assert!(h.sessions.get(child_id).unwrap().benchmark.is_none());
    }
    assert!(!benchmark_dir.exists());
}

#[tokio::test]
async fn test_restart_stops_previous_benchmark() {
    let h = harness();
    create_parent(&h);
    let first = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let old_children: Vec<String> = first
        .children
        .iter()
        .map(|c| c.session_id.clone())
        .collect();

    let second = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();

    for old_id in &old_children {
        assert!(h.sessions.get(old_id).unwrap().benchmark.is_none());
        assert!(!second.children.iter().any(|c| &c.session_id == old_id));
    }
    assert_eq!(second.children.len(), 2);
    for child in &second.children {
        assert!(child.worktree.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn test_child_worktree_recreated_after_external_delete() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();
    let child_id = record.children[0].session_id.clone();
    let worktree = record.children[0].worktree.clone().unwrap();

    fs::remove_dir_all(&worktree).unwrap();

    let recreated = h.bench.ensure_child_worktree(&child_id).await.unwrap();
    assert_eq!(
        fs::read_to_string(recreated.join("README.md")).unwrap(),
        "# fixture\n"
    );

    // The recreated path is written back onto both sides.
    let session = h.sessions.get(&child_id).unwrap();
    match session.benchmark {
        Some(SessionBenchmarkState::Child(child)) => {
            assert_eq!(child.worktree.as_deref(), Some(recreated.as_path()));
        }
        other => panic!("expected child benchmark state, got {:?}", other),
    }
    let (_, parent) = h.bench.resolve_parent_record("parent").unwrap().unwrap();
    assert_eq!(
        parent.child(&child_id).unwrap().worktree.as_deref(),
        Some(recreated.as_path())
    );
}

#[tokio::test]
async fn test_ensure_base_snapshot_returns_start_state() {
    let h = harness();
    create_parent(&h);
    let record = h
        .bench
        .start("parent", StartOptions::default())
        .await
        .unwrap();

    let from_parent = h.bench.ensure_base_snapshot("parent").unwrap();
    let from_child = h
        .bench
        .ensure_base_snapshot(&record.children[0].session_id)
        .unwrap();
    assert_eq!(from_parent, record.base_snapshot);
    assert_eq!(from_child, record.base_snapshot);
}
