//! Git-backed snapshot store
//!
//! Snapshots are git tree objects in a project-scoped object database under
//! `<data_root>/snapshot/<project_id>/`, driven entirely through `git`
//! plumbing as a subprocess. The database is separate from the user's own
//! repository; every call addresses it with an explicit `--git-dir`,
//! `--work-tree`, and a private `GIT_INDEX_FILE`, so index state never leaks
//! between concurrent operations or between worktrees sharing the database.
//!
//! The user's repository is only ever consulted read-only, through `git2`,
//! for the "is this under version control" and dirty-worktree probes.

use super::{
    ContentStore, FileDiff, FilePatch, PatchOptions, RestoreOptions, Snapshot, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use colored::Colorize;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;
use walkdir::WalkDir;

/// Derive the object-database key for a workspace from its canonical path
pub fn project_id(workspace: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workspace.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Scratch index file, removed when the operation finishes
struct ScratchIndex(PathBuf);

impl ScratchIndex {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchIndex {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn numstat_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+|-)\t(\d+|-)\t(.+)$").unwrap())
}

/// Snapshot store for one tracked directory
pub struct GitStore {
    /// Directory captured by `track` and targeted by `restore`
    workspace: PathBuf,

    /// The user's project root; version-control and dirty probes run here
    project_root: PathBuf,

    /// Shared object database, `<data_root>/snapshot/<project_id>`
    git_dir: PathBuf,

    enabled: bool,
}

impl GitStore {
    /// Open the store for a workspace, deriving the object-database location
    /// from the workspace's canonical path
    pub fn open(workspace: &Path, data_root: &Path, enabled: bool) -> StoreResult<Self> {
        let workspace = workspace.canonicalize()?;
        let data_root = if data_root.is_relative() {
            std::env::current_dir()?.join(data_root)
        } else {
            data_root.to_path_buf()
        };
        let git_dir = data_root.join("snapshot").join(project_id(&workspace));
        Ok(Self {
            project_root: workspace.clone(),
            workspace,
            git_dir,
            enabled,
        })
    }

    /// A store over the same object database tracking a different directory.
    /// Used to snapshot per-child worktrees; the version-control precondition
    /// still refers to the originating project.
    pub fn for_worktree(&self, dir: &Path) -> Self {
        Self {
            workspace: dir.to_path_buf(),
            project_root: self.project_root.clone(),
            git_dir: self.git_dir.clone(),
            enabled: self.enabled,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Whether the project root sits inside a git repository
    pub fn is_version_controlled(&self) -> bool {
        git2::Repository::discover(&self.project_root).is_ok()
    }

    fn scratch_index(&self) -> ScratchIndex {
        ScratchIndex(self.git_dir.join(format!("index-{}", Uuid::new_v4())))
    }

    /// Initialize the object database on first use
    async fn ensure_db(&self) -> StoreResult<()> {
        if self.git_dir.join("HEAD").exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.git_dir)?;

        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&self.git_dir)
            .args(["init", "--quiet"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            return Err(StoreError::Git {
                command: "init".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn git_command(&self, worktree: &Path, index: Option<&ScratchIndex>, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir")
            .arg(&self.git_dir)
            .arg("--work-tree")
            .arg(worktree)
            .args(args)
            .current_dir(worktree)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(index) = index {
            cmd.env("GIT_INDEX_FILE", index.path());
        }
        cmd
    }

    async fn git_bytes(
        &self,
        worktree: &Path,
        index: Option<&ScratchIndex>,
        args: &[&str],
    ) -> StoreResult<Vec<u8>> {
        let output = self.git_command(worktree, index, args).output().await?;
        if !output.status.success() {
            return Err(StoreError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn git(
        &self,
        worktree: &Path,
        index: Option<&ScratchIndex>,
        args: &[&str],
    ) -> StoreResult<String> {
        let stdout = self.git_bytes(worktree, index, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Stage the worktree's current state into a scratch index
    async fn stage_all(&self, worktree: &Path) -> StoreResult<ScratchIndex> {
        let index = self.scratch_index();
        self.git(worktree, Some(&index), &["add", "-A", "."]).await?;
        Ok(index)
    }

    /// File content as of a snapshot, or a git error if absent there
    async fn blob(&self, snapshot: &Snapshot, file: &str) -> StoreResult<Vec<u8>> {
        let spec = format!("{}:{}", snapshot, file);
        self.git_bytes(&self.workspace, None, &["cat-file", "-p", &spec])
            .await
    }

    async fn blob_text(&self, snapshot: &Snapshot, file: &str) -> String {
        match self.blob(snapshot, file).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        }
    }

    /// Fast path shared by `restore` and `restore_to`: load the snapshot into
    /// a scratch index and let `checkout-index` materialize it
    async fn checkout(
        &self,
        snapshot: &Snapshot,
        worktree: &Path,
        options: RestoreOptions,
    ) -> StoreResult<()> {
        let index = self.scratch_index();
        self.git(worktree, Some(&index), &["read-tree", snapshot.as_str()])
            .await?;
        self.git(worktree, Some(&index), &["checkout-index", "-a", "-f"])
            .await?;

        if options.clean_untracked {
            // With the snapshot loaded in the index, --others is exactly the
            // set of files that exist on disk but not in the snapshot.
            let extras = self
                .git(
                    worktree,
                    Some(&index),
                    &["ls-files", "--others", "--exclude-standard", "-z"],
                )
                .await?;
            for rel in extras.split('\0').filter(|s| !s.is_empty()) {
                match std::fs::remove_file(worktree.join(rel)) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }

    /// Slow restore for arbitrary worktrees: enumerate the snapshot, delete
    /// files absent from it, then re-materialize every snapshot file
    async fn restore_by_listing(
        &self,
        snapshot: &Snapshot,
        target: &Path,
        options: RestoreOptions,
    ) -> StoreResult<()> {
        let listing = self
            .git(target, None, &["ls-tree", "-r", "--name-only", "-z", snapshot.as_str()])
            .await?;
        let wanted: HashSet<&str> = listing.split('\0').filter(|s| !s.is_empty()).collect();

        if options.clean_untracked {
            let walker = WalkDir::new(target)
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git");
            for entry in walker {
                let entry = entry.map_err(std::io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(target)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned();
                if !wanted.contains(rel.as_str()) {
                    std::fs::remove_file(entry.path())?;
                }
            }
        }

        for rel in &wanted {
            let content = self
                .git_bytes(target, None, &["cat-file", "-p", &format!("{}:{}", snapshot, rel)])
                .await?;
            let dest = target.join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, &content)?;
        }
        Ok(())
    }

    /// Parse `--numstat` output into file diffs, resolving content from the
    /// given sides
    async fn numstat_to_diffs(
        &self,
        numstat: &str,
        sides: DiffSides<'_>,
    ) -> StoreResult<Vec<FileDiff>> {
        let mut diffs = Vec::new();
        for line in numstat.lines() {
            let Some(captures) = numstat_line().captures(line) else {
                continue;
            };
            let file = captures[3].to_string();
            // Binary files are reported, not content-diffed.
            if &captures[1] == "-" {
                diffs.push(FileDiff {
                    file,
                    before: String::new(),
                    after: String::new(),
                    additions: 0,
                    deletions: 0,
                });
                continue;
            }
            let additions = captures[1].parse().unwrap_or(0);
            let deletions = captures[2].parse().unwrap_or(0);
            let (before, after) = match sides {
                DiffSides::Trees { a, b } => {
                    (self.blob_text(a, &file).await, self.blob_text(b, &file).await)
                }
                DiffSides::Working { from } => {
                    let current = std::fs::read(self.workspace.join(&file))
                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                        .unwrap_or_default();
                    (self.blob_text(from, &file).await, current)
                }
            };
            diffs.push(FileDiff {
                file,
                before,
                after,
                additions,
                deletions,
            });
        }
        Ok(diffs)
    }
}

/// Where the before/after content of a file diff comes from
#[derive(Clone, Copy)]
enum DiffSides<'a> {
    /// Between two snapshots
    Trees { a: &'a Snapshot, b: &'a Snapshot },
    /// From a snapshot to the current working state
    Working { from: &'a Snapshot },
}

#[async_trait]
impl ContentStore for GitStore {
    async fn track(&self) -> StoreResult<Option<Snapshot>> {
        if !self.enabled || !self.is_version_controlled() {
            return Ok(None);
        }
        self.ensure_db().await?;
        let index = self.stage_all(&self.workspace).await?;
        let tree = self
            .git(&self.workspace, Some(&index), &["write-tree"])
            .await?;
        Ok(Some(Snapshot::new(tree.trim())))
    }

    async fn restore(&self, snapshot: &Snapshot, options: RestoreOptions) -> StoreResult<()> {
        self.ensure_db().await?;
        self.checkout(snapshot, &self.workspace, options).await
    }

    async fn restore_to(
        &self,
        snapshot: &Snapshot,
        target: &Path,
        options: RestoreOptions,
    ) -> StoreResult<()> {
        self.ensure_db().await?;
        std::fs::create_dir_all(target)?;
        match self.checkout(snapshot, target, options).await {
            Ok(()) => Ok(()),
            Err(err) => {
                eprintln!(
                    "{}",
                    format!(
                        "Warning: fast restore into {} failed ({}), rebuilding file by file",
                        target.display(),
                        err
                    )
                    .yellow()
                );
                self.restore_by_listing(snapshot, target, options).await
            }
        }
    }

    async fn diff(&self, from: &Snapshot) -> StoreResult<String> {
        self.ensure_db().await?;
        let index = self.stage_all(&self.workspace).await?;
        self.git(
            &self.workspace,
            Some(&index),
            &["diff-index", "-p", "--cached", from.as_str()],
        )
        .await
    }

    async fn diff_between(&self, a: &Snapshot, b: &Snapshot) -> StoreResult<String> {
        self.ensure_db().await?;
        self.git(
            &self.workspace,
            None,
            &["diff-tree", "-r", "-p", a.as_str(), b.as_str()],
        )
        .await
    }

    async fn diff_full(&self, a: &Snapshot, b: &Snapshot) -> StoreResult<Vec<FileDiff>> {
        self.ensure_db().await?;
        let numstat = self
            .git(
                &self.workspace,
                None,
                &["diff-tree", "-r", "--numstat", a.as_str(), b.as_str()],
            )
            .await?;
        self.numstat_to_diffs(&numstat, DiffSides::Trees { a, b }).await
    }

    async fn diff_files(&self, from: &Snapshot) -> StoreResult<Vec<FileDiff>> {
        self.ensure_db().await?;
        let index = self.stage_all(&self.workspace).await?;
        let numstat = self
            .git(
                &self.workspace,
                Some(&index),
                &["diff-index", "--cached", "--numstat", from.as_str()],
            )
            .await?;
        self.numstat_to_diffs(&numstat, DiffSides::Working { from }).await
    }

    async fn patch(&self, snapshot: &Snapshot) -> StoreResult<FilePatch> {
        self.ensure_db().await?;
        let index = self.stage_all(&self.workspace).await?;
        let names = self
            .git(
                &self.workspace,
                Some(&index),
                &["diff-index", "--cached", "--name-only", "-z", snapshot.as_str()],
            )
            .await?;
        Ok(FilePatch {
            snapshot: snapshot.clone(),
            files: names
                .split('\0')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    async fn revert(&self, patches: &[FilePatch]) -> StoreResult<()> {
        self.ensure_db().await?;
        let mut seen = HashSet::new();
        for patch in patches {
            for file in &patch.files {
                if !seen.insert(file.clone()) {
                    continue;
                }
                match self.blob(&patch.snapshot, file).await {
                    Ok(content) => {
                        let dest = self.workspace.join(file);
                        if let Some(parent) = dest.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        std::fs::write(&dest, &content)?;
                    }
                    // Not in the snapshot: the recorded edit created it.
                    Err(StoreError::Git { .. }) => {
                        match std::fs::remove_file(self.workspace.join(file)) {
                            Ok(()) => {}
                            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                            Err(err) => return Err(err.into()),
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    async fn apply_patch(&self, diff: &str, options: PatchOptions) -> StoreResult<bool> {
        self.ensure_db().await?;
        let mut args = vec!["apply"];
        if options.three_way {
            args.push("--3way");
        }
        if options.reverse {
            args.push("--reverse");
        }

        let mut cmd = self.git_command(&self.workspace, None, &args);
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(diff.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        Ok(output.status.success())
    }

    async fn is_workspace_dirty(&self) -> StoreResult<bool> {
        let repo = git2::Repository::discover(&self.project_root)?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }
}
