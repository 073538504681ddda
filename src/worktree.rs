//! The Worktree Manager (C4): isolated working copies of the source tree
//! rooted at a given commit, one per parallel task worker, with guaranteed
//! cleanup on every exit path (§4.6).
//!
//! Earlier single-tree designs snapshot-committed the project repo in
//! place instead of isolating each worker; here each worker gets a real
//! `git2` worktree checked out on its own branch, and the diff machinery
//! (`compute_changes`/`get_full_diffs`) operates on any two trees,
//! worktree or not.

use crate::audit::{ChangeType, FileChangeSummary, FileDiff};
use anyhow::{Context, Result, bail};
use git2::{Delta, DiffOptions, Repository, Signature, WorktreeAddOptions};
use std::path::{Path, PathBuf};

/// Owns one checked-out worktree for the lifetime of a task worker.
/// Dropping it without calling [`WorktreeManager::cleanup`] first leaks the
/// worktree on disk rather than silently discarding unmerged commits.
pub struct TaskWorktree {
    pub task_id: String,
    pub branch_name: String,
    pub path: PathBuf,
    released: bool,
}

/// Scoped acquisition of isolated working copies rooted at a given commit.
pub struct WorktreeManager {
    repo: Repository,
    worktrees_root: PathBuf,
}

impl WorktreeManager {
    pub fn new(project_dir: &Path, worktrees_root: PathBuf) -> Result<Self> {
        let repo = Repository::open(project_dir).context("failed to open git repository")?;
        std::fs::create_dir_all(&worktrees_root).context("failed to create worktrees root")?;
        Ok(Self { repo, worktrees_root })
    }

    /// The commit the project repo's HEAD currently points at, used by
    /// callers as the `base_sha` for a fresh round of task worktrees.
    pub fn head_sha(&self) -> Result<String> {
        Ok(self.repo.head()?.peel_to_commit()?.id().to_string())
    }

    /// Checks out a new branch at `base_sha` and adds a `git2` worktree for
    /// it under the worktrees root, exclusively owned by the caller.
    pub fn acquire(&self, task_id: &str, base_sha: &str) -> Result<TaskWorktree> {
        let base_oid = git2::Oid::from_str(base_sha)?;
        let base_commit = self.repo.find_commit(base_oid)?;
        let branch_name = format!("conductor/{task_id}");

        // Re-creating an existing branch for a retried task is fine; drop
        // the stale one first.
        if let Ok(mut existing) = self.repo.find_branch(&branch_name, git2::BranchType::Local) {
            existing.delete().ok();
        }
        self.repo.branch(&branch_name, &base_commit, true)?;

        let worktree_path = self.worktrees_root.join(task_id);
        if worktree_path.exists() {
            std::fs::remove_dir_all(&worktree_path).ok();
        }

        let mut opts = WorktreeAddOptions::new();
        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{branch_name}"))?;
        opts.reference(Some(&reference));
        self.repo.worktree(task_id, &worktree_path, Some(&opts))?;

        Ok(TaskWorktree {
            task_id: task_id.to_string(),
            branch_name,
            path: worktree_path,
            released: false,
        })
    }

    /// Commits all changes inside the worktree so they can be diffed or
    /// cherry-picked back into the feature branch.
    pub fn snapshot(&self, worktree: &TaskWorktree, message: &str) -> Result<String> {
        let wt_repo = Repository::open(&worktree.path)?;
        let mut index = wt_repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = wt_repo.find_tree(tree_id)?;
        let sig = Signature::now("conductor", "conductor@localhost")?;

        let parent = wt_repo.head()?.peel_to_commit()?;
        let commit_id = wt_repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
        Ok(commit_id.to_string())
    }

    pub fn compute_changes(&self, worktree: &TaskWorktree, base_sha: &str) -> Result<FileChangeSummary> {
        let wt_repo = Repository::open(&worktree.path)?;
        let base_oid = git2::Oid::from_str(base_sha)?;
        let base_tree = wt_repo.find_commit(base_oid)?.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true);
        let diff = wt_repo.diff_tree_to_workdir_with_index(Some(&base_tree), Some(&mut opts))?;

        let mut summary = FileChangeSummary::default();
        diff.foreach(
            &mut |delta, _progress| {
                if let Some(path) = delta.new_file().path() {
                    let path_buf = path.to_path_buf();
                    match delta.status() {
                        Delta::Added | Delta::Untracked => summary.files_added.push(path_buf),
                        Delta::Modified => summary.files_modified.push(path_buf),
                        Delta::Deleted => summary.files_deleted.push(path_buf),
                        _ => {}
                    }
                }
                true
            },
            None,
            None,
            Some(&mut |_delta, _hunk, line| {
                match line.origin() {
                    '+' => summary.total_lines_added += 1,
                    '-' => summary.total_lines_removed += 1,
                    _ => {}
                }
                true
            }),
        )?;
        Ok(summary)
    }

    pub fn get_full_diffs(&self, worktree: &TaskWorktree, base_sha: &str) -> Result<Vec<FileDiff>> {
        let wt_repo = Repository::open(&worktree.path)?;
        let base_oid = git2::Oid::from_str(base_sha)?;
        let base_tree = wt_repo.find_commit(base_oid)?.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true);
        let diff = wt_repo.diff_tree_to_workdir_with_index(Some(&base_tree), Some(&mut opts))?;

        let mut file_diffs = Vec::new();
        for delta_idx in 0..diff.deltas().len() {
            let Some(delta) = diff.get_delta(delta_idx) else { continue };
            let Some(path) = delta.new_file().path() else { continue };
            let path = path.to_path_buf();
            let change_type = match delta.status() {
                Delta::Added | Delta::Untracked => ChangeType::Added,
                Delta::Modified => ChangeType::Modified,
                Delta::Deleted => ChangeType::Deleted,
                Delta::Renamed => ChangeType::Renamed,
                _ => continue,
            };

            let mut lines_added = 0;
            let mut lines_removed = 0;
            let mut diff_content = String::new();
            if let Ok(Some(mut patch)) = git2::Patch::from_diff(&diff, delta_idx) {
                let mut buf = Vec::new();
                patch
                    .print(&mut |_delta, _hunk, line| {
                        match line.origin() {
                            '+' => lines_added += 1,
                            '-' => lines_removed += 1,
                            _ => {}
                        }
                        buf.extend_from_slice(line.content());
                        true
                    })
                    .ok();
                diff_content = String::from_utf8_lossy(&buf).to_string();
            }
            file_diffs.push(FileDiff { path, change_type, lines_added, lines_removed, diff_content });
        }
        Ok(file_diffs)
    }

    /// Cherry-picks the worktree's commits onto the feature branch, then
    /// tears the worktree down. Call sites are expected to invoke this in
    /// task-id order (§4.2.5).
    pub fn land_and_release(&self, mut worktree: TaskWorktree, feature_branch: &str) -> Result<()> {
        let wt_repo = Repository::open(&worktree.path)?;
        let commit = wt_repo.head()?.peel_to_commit()?;

        let mut feature_ref = self
            .repo
            .find_reference(&format!("refs/heads/{feature_branch}"))
            .or_else(|_| self.repo.reference(&format!("refs/heads/{feature_branch}"), commit.id(), false, ""))?;

        let annotated = self.repo.find_annotated_commit(commit.id())?;
        let (merge_analysis, _) = self.repo.merge_analysis(&[&annotated])?;
        if merge_analysis.is_fast_forward() {
            feature_ref.set_target(commit.id(), "conductor: cherry-pick task worktree")?;
        } else {
            bail!("cherry-pick of task {} is not a fast-forward; manual resolution required", worktree.task_id);
        }

        worktree.released = true;
        self.cleanup(worktree)
    }

    /// Tears down a worktree: removes the checkout, deletes the branch, and
    /// clears lock files. Refuses to destroy a worktree whose commits were
    /// never landed unless it was explicitly released (§4.6).
    pub fn cleanup(&self, mut worktree: TaskWorktree) -> Result<()> {
        if !worktree.released && self.has_uncherry_picked_commits(&worktree)? {
            bail!(
                "refusing to destroy worktree for task {}: it has commits not yet cherry-picked; call land_and_release or release() first",
                worktree.task_id
            );
        }

        if worktree.path.exists() {
            std::fs::remove_dir_all(&worktree.path).ok();
        }
        if let Ok(mut wt) = self.repo.find_worktree(&worktree.task_id) {
            wt.prune(None).ok();
        }
        if let Ok(mut branch) = self.repo.find_branch(&worktree.branch_name, git2::BranchType::Local) {
            branch.delete().ok();
        }
        let lock = self
            .worktrees_root
            .join(".git")
            .join("worktrees")
            .join(&worktree.task_id)
            .join("locked");
        std::fs::remove_file(lock).ok();

        worktree.released = true;
        Ok(())
    }

    /// Explicitly discards a worktree's commits without landing them.
    pub fn release(&self, mut worktree: TaskWorktree) -> Result<()> {
        worktree.released = true;
        self.cleanup(worktree)
    }

    fn has_uncherry_picked_commits(&self, worktree: &TaskWorktree) -> Result<bool> {
        let branch = self.repo.find_branch(&worktree.branch_name, git2::BranchType::Local)?;
        let tip = branch.get().peel_to_commit()?;
        // A worktree with only its single base commit (no new work) is safe
        // to discard; anything beyond that is unreviewed work.
        Ok(tip.parent_count() > 0 && tip.parent(0).map(|p| p.id() != tip.id()).unwrap_or(true))
    }
}

impl Drop for TaskWorktree {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(task_id = %self.task_id, path = %self.path.display(), "task worktree dropped without explicit cleanup");
        }
    }
}
