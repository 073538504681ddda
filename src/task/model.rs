//! Task data model (spec.md §3 "Task" entity).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// The status machine from §4.2.4.
///
/// `pending` -> `blocked` when a dependency is incomplete; `pending`/
/// `blocked` -> `in_progress` once dependencies, a worker slot, and file
/// exclusivity all hold; `in_progress` -> `completed` after Verification
/// passes for that task; `in_progress` -> `retry` on test failure or
/// reviewer rejection (attempt counter increments, loops back to
/// `in_progress` up to 3 attempts); `retry` -> `failed` once attempts are
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Blocked,
    InProgress,
    Retry,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A description of why a task last failed or was sent back for retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub kind: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A unit of work produced by Planning and consumed by Implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// `T<n>` with optional `-<letter>` suffix for splits.
    pub id: String,
    /// <= 80 chars.
    pub title: String,
    pub user_story: String,
    /// <= 5 entries.
    pub acceptance_criteria: Vec<String>,
    /// <= 3 entries.
    pub files_to_create: Vec<PathBuf>,
    /// <= 5 entries.
    pub files_to_modify: Vec<PathBuf>,
    pub dependencies: Vec<String>,
    pub priority: Priority,
    pub complexity_score: f64,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub last_error: Option<LastError>,
    pub worktree_path: Option<PathBuf>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            user_story: String::new(),
            acceptance_criteria: Vec::new(),
            files_to_create: Vec::new(),
            files_to_modify: Vec::new(),
            dependencies: Vec::new(),
            priority: Priority::Medium,
            complexity_score: 0.0,
            status: TaskStatus::Pending,
            attempt_count: 0,
            last_error: None,
            worktree_path: None,
        }
    }

    /// All file paths this task touches, for implicit-dependency and
    /// file-conflict detection (§4.2.3, §4.2.5).
    pub fn all_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files_to_create.iter().chain(self.files_to_modify.iter())
    }

    pub fn exceeds_file_caps(&self) -> bool {
        self.files_to_create.len() > 3 || self.files_to_modify.len() > 5
    }

    /// Invariant 1/§4.2.4: dependencies complete is a precondition of
    /// entering `in_progress`.
    pub fn dependencies_satisfied(&self, completed: &std::collections::HashSet<String>) -> bool {
        self.dependencies.iter().all(|d| completed.contains(d))
    }
}
