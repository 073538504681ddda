//! File-change accounting shared by the Worktree Manager (C4).
//!
//! Trimmed to the diff-shape types that
//! `WorktreeManager::compute_changes`/`get_full_diffs` still produce. An
//! earlier per-iteration `AuditRun`/`PhaseAudit`/`ClaudeSession` logging
//! design (tied to a promise-tag iteration loop) has no counterpart here —
//! the Workflow Store's `phase_outputs` and `checkpoints` tables are this
//! crate's audit trail, and every transition additionally goes through
//! `tracing::info!` (see `orchestrator::driver`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub change_type: ChangeType,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub diff_content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileChangeSummary {
    pub files_added: Vec<PathBuf>,
    pub files_modified: Vec<PathBuf>,
    pub files_deleted: Vec<PathBuf>,
    pub total_lines_added: usize,
    pub total_lines_removed: usize,
}

impl FileChangeSummary {
    pub fn total_files(&self) -> usize {
        self.files_added.len() + self.files_modified.len() + self.files_deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_files() == 0
    }
}
