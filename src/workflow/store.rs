//! The Workflow Store (C2): durable, append-only persistence for
//! workflows, phase outputs, tasks, checkpoints, budget records, and
//! review decisions (§4.4).
//!
//! Grounded on the teacher's `factory::db::FactoryDb`: a single
//! `rusqlite::Connection`, `PRAGMA foreign_keys = ON` followed by an
//! `execute_batch` migration script run at open time, and CRUD methods
//! built from `prepare` + `query_map`/`query_row` + `execute`. Checkpoint
//! and rollback have no teacher analogue; they are new logic built on the
//! same connection, following invariant 6: phase outputs are append-only,
//! rollback only moves which checkpoint is current.

use crate::errors::StoreError;
use crate::phase::{ExecutionMode, Phase, PhaseStatus};
use crate::review::arbiter::ReviewDecision;
use crate::task::model::{Priority, Task, TaskStatus};
use crate::workflow::model::{Checkpoint, PhaseOutput, PhaseOutputType, Workflow};
use rusqlite::{params, Connection};
use std::path::Path;

pub struct WorkflowStore {
    conn: Connection,
}

impl WorkflowStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workflows (
                    id TEXT PRIMARY KEY,
                    project_id TEXT NOT NULL,
                    current_phase INTEGER NOT NULL,
                    execution_mode TEXT NOT NULL,
                    plan_ref TEXT,
                    task_set_ref TEXT,
                    pending_interrupt TEXT,
                    iteration_count INTEGER NOT NULL DEFAULT 0,
                    iteration_cap INTEGER NOT NULL DEFAULT 50,
                    feature_branch TEXT NOT NULL,
                    phase_status TEXT NOT NULL,
                    cancelled INTEGER NOT NULL DEFAULT 0,
                    last_updated TEXT NOT NULL DEFAULT (datetime('now')),
                    current_checkpoint_seq INTEGER NOT NULL DEFAULT 0,
                    skip_validation INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS phase_outputs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    phase INTEGER NOT NULL,
                    output_type TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    producing_agent TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT NOT NULL,
                    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    user_story TEXT NOT NULL DEFAULT '',
                    acceptance_criteria TEXT NOT NULL DEFAULT '[]',
                    files_to_create TEXT NOT NULL DEFAULT '[]',
                    files_to_modify TEXT NOT NULL DEFAULT '[]',
                    dependencies TEXT NOT NULL DEFAULT '[]',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    complexity_score REAL NOT NULL DEFAULT 0.0,
                    status TEXT NOT NULL DEFAULT 'pending',
                    attempt_count INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    worktree_path TEXT,
                    PRIMARY KEY (workflow_id, id)
                );

                CREATE TABLE IF NOT EXISTS checkpoints (
                    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    seq INTEGER NOT NULL,
                    snapshot TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (workflow_id, seq)
                );

                CREATE TABLE IF NOT EXISTS budget_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    task_id TEXT NOT NULL,
                    agent_id TEXT NOT NULL,
                    cost_units REAL NOT NULL,
                    duration_ms INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS review_decisions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    phase INTEGER NOT NULL,
                    decision TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_phase_outputs_workflow ON phase_outputs(workflow_id, output_type, seq);
                CREATE INDEX IF NOT EXISTS idx_tasks_workflow ON tasks(workflow_id);
                CREATE INDEX IF NOT EXISTS idx_checkpoints_workflow ON checkpoints(workflow_id, seq);
                CREATE INDEX IF NOT EXISTS idx_budget_records_task ON budget_records(workflow_id, task_id);
                ",
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    // ── Workflow ──────────────────────────────────────────────────────

    pub fn create(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let phase_status_json = serde_json::to_string(&workflow.phase_status)
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let pending_interrupt_json = workflow
            .pending_interrupt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.conn
            .execute(
                "INSERT INTO workflows (id, project_id, current_phase, execution_mode, plan_ref, task_set_ref,
                    pending_interrupt, iteration_count, iteration_cap, feature_branch, phase_status, cancelled, last_updated, skip_validation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    workflow.id,
                    workflow.project_id,
                    workflow.current_phase.number(),
                    mode_to_str(workflow.execution_mode),
                    workflow.plan_ref,
                    workflow.task_set_ref,
                    pending_interrupt_json,
                    workflow.iteration_count,
                    workflow.iteration_cap,
                    workflow.feature_branch,
                    phase_status_json,
                    workflow.cancelled as i64,
                    workflow.last_updated.to_rfc3339(),
                    workflow.skip_validation as i64,
                ],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    pub fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let phase_status_json = serde_json::to_string(&workflow.phase_status)
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let pending_interrupt_json = workflow
            .pending_interrupt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let updated = self
            .conn
            .execute(
                "UPDATE workflows SET current_phase = ?2, execution_mode = ?3, plan_ref = ?4, task_set_ref = ?5,
                    pending_interrupt = ?6, iteration_count = ?7, iteration_cap = ?8, feature_branch = ?9,
                    phase_status = ?10, cancelled = ?11, last_updated = ?12, skip_validation = ?13
                 WHERE id = ?1",
                params![
                    workflow.id,
                    workflow.current_phase.number(),
                    mode_to_str(workflow.execution_mode),
                    workflow.plan_ref,
                    workflow.task_set_ref,
                    pending_interrupt_json,
                    workflow.iteration_count,
                    workflow.iteration_cap,
                    workflow.feature_branch,
                    phase_status_json,
                    workflow.cancelled as i64,
                    workflow.last_updated.to_rfc3339(),
                    workflow.skip_validation as i64,
                ],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        if updated == 0 {
            return Err(StoreError::WorkflowNotFound(workflow.id.clone()));
        }
        Ok(())
    }

    pub fn load(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
        self.conn
            .query_row(
                "SELECT id, project_id, current_phase, execution_mode, plan_ref, task_set_ref,
                    pending_interrupt, iteration_count, iteration_cap, feature_branch, phase_status, cancelled, last_updated, skip_validation
                 FROM workflows WHERE id = ?1",
                params![workflow_id],
                row_to_workflow,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::WorkflowNotFound(workflow_id.to_string()),
                other => StoreError::Database(anyhow::anyhow!(other.to_string())),
            })
    }

    /// Finds the most recently created, not-yet-terminal workflow for a
    /// project, if any. Used by `start` to satisfy §8's idempotence
    /// property ("`start` on an already-started workflow returns the
    /// existing id without mutating state") without the caller having to
    /// remember a workflow id across invocations.
    pub fn find_active_by_project(&self, project_id: &str) -> Result<Option<Workflow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, current_phase, execution_mode, plan_ref, task_set_ref,
                    pending_interrupt, iteration_count, iteration_cap, feature_branch, phase_status, cancelled, last_updated, skip_validation
                 FROM workflows WHERE project_id = ?1 AND cancelled = 0
                    AND NOT (current_phase = 5 AND json_extract(phase_status, '$.completion') = 'completed')
                 ORDER BY rowid DESC LIMIT 1",
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let mut rows = stmt
            .query_map(params![project_id], row_to_workflow)
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?)),
            None => Ok(None),
        }
    }

    /// The checkpoint sequence the workflow currently points at, for
    /// display in `status` output and in user-visible failure reports
    /// (§7 "the nearest checkpoint sequence number").
    pub fn current_checkpoint_seq(&self, workflow_id: &str) -> Result<i64, StoreError> {
        self.conn
            .query_row(
                "SELECT current_checkpoint_seq FROM workflows WHERE id = ?1",
                params![workflow_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::WorkflowNotFound(workflow_id.to_string()),
                other => StoreError::Database(anyhow::anyhow!(other.to_string())),
            })
    }

    // ── Phase outputs (append-only) ──────────────────────────────────

    /// Appends a phase output and returns its monotonic sequence number
    /// within (workflow_id, output_type). Never overwrites or deletes a
    /// prior output of the same type (invariant 6).
    pub fn append_phase_output(
        &self,
        workflow_id: &str,
        phase: Phase,
        output_type: PhaseOutputType,
        payload: &serde_json::Value,
        producing_agent: &str,
    ) -> Result<i64, StoreError> {
        let type_str = output_type_to_str(output_type);
        let next_seq: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM phase_outputs WHERE workflow_id = ?1 AND output_type = ?2",
                params![workflow_id, type_str],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let payload_json = serde_json::to_string(payload).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.conn
            .execute(
                "INSERT INTO phase_outputs (workflow_id, phase, output_type, payload, producing_agent, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![workflow_id, phase.number(), type_str, payload_json, producing_agent, next_seq],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(next_seq)
    }

    /// Returns every output of `output_type` for a workflow in append order.
    pub fn query_by_type(&self, workflow_id: &str, output_type: PhaseOutputType) -> Result<Vec<PhaseOutput>, StoreError> {
        let type_str = output_type_to_str(output_type);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, workflow_id, phase, output_type, payload, producing_agent, seq, created_at
                 FROM phase_outputs WHERE workflow_id = ?1 AND output_type = ?2 ORDER BY seq",
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let rows = stmt
            .query_map(params![workflow_id, type_str], row_to_phase_output)
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let mut outputs = Vec::new();
        for row in rows {
            outputs.push(row.map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?);
        }
        Ok(outputs)
    }

    /// The most recent output of `output_type`, if any.
    pub fn latest_by_type(&self, workflow_id: &str, output_type: PhaseOutputType) -> Result<Option<PhaseOutput>, StoreError> {
        Ok(self.query_by_type(workflow_id, output_type)?.into_iter().last())
    }

    // ── Tasks ──────────────────────────────────────────────────────────

    pub fn upsert_task(&self, workflow_id: &str, task: &Task) -> Result<(), StoreError> {
        let acceptance = serde_json::to_string(&task.acceptance_criteria).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let creates = serde_json::to_string(&task.files_to_create).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let modifies = serde_json::to_string(&task.files_to_modify).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let deps = serde_json::to_string(&task.dependencies).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let last_error = task
            .last_error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.conn
            .execute(
                "INSERT INTO tasks (id, workflow_id, title, user_story, acceptance_criteria, files_to_create,
                    files_to_modify, dependencies, priority, complexity_score, status, attempt_count, last_error, worktree_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(workflow_id, id) DO UPDATE SET
                    title = excluded.title, user_story = excluded.user_story, acceptance_criteria = excluded.acceptance_criteria,
                    files_to_create = excluded.files_to_create, files_to_modify = excluded.files_to_modify,
                    dependencies = excluded.dependencies, priority = excluded.priority, complexity_score = excluded.complexity_score,
                    status = excluded.status, attempt_count = excluded.attempt_count, last_error = excluded.last_error,
                    worktree_path = excluded.worktree_path",
                params![
                    task.id,
                    workflow_id,
                    task.title,
                    task.user_story,
                    acceptance,
                    creates,
                    modifies,
                    deps,
                    priority_to_str(task.priority),
                    task.complexity_score,
                    task_status_to_str(task.status),
                    task.attempt_count,
                    last_error,
                    task.worktree_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                ],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    pub fn list_tasks(&self, workflow_id: &str) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, user_story, acceptance_criteria, files_to_create, files_to_modify, dependencies,
                    priority, complexity_score, status, attempt_count, last_error, worktree_path
                 FROM tasks WHERE workflow_id = ?1 ORDER BY id",
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let rows = stmt
            .query_map(params![workflow_id], row_to_task)
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?);
        }
        Ok(tasks)
    }

    // ── Checkpoint / rollback (invariant 6) ────────────────────────────

    /// Snapshots the current workflow state as a new checkpoint and
    /// advances the workflow's `current_checkpoint_seq`. Phase outputs are
    /// never touched; only the checkpoint table grows.
    pub fn checkpoint(&self, workflow: &Workflow) -> Result<i64, StoreError> {
        let next_seq: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM checkpoints WHERE workflow_id = ?1",
                params![workflow.id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let snapshot_json = serde_json::to_string(workflow).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.conn
            .execute(
                "INSERT INTO checkpoints (workflow_id, seq, snapshot) VALUES (?1, ?2, ?3)",
                params![workflow.id, next_seq, snapshot_json],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.conn
            .execute(
                "UPDATE workflows SET current_checkpoint_seq = ?2 WHERE id = ?1",
                params![workflow.id, next_seq],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(next_seq)
    }

    /// Restores the workflow row to a previously recorded checkpoint.
    /// Existing phase outputs with a higher seq than the checkpoint's own
    /// are left in place; they simply become invisible to anything that
    /// reads "current" state through this store, consistent with
    /// invariant 6 (rollback never deletes).
    pub fn rollback(&self, workflow_id: &str, target_seq: i64) -> Result<Workflow, StoreError> {
        if let Some(task_id) = self.find_in_progress_task(workflow_id)? {
            return Err(StoreError::RollbackBusy { task_id });
        }
        let snapshot_json: String = self
            .conn
            .query_row(
                "SELECT snapshot FROM checkpoints WHERE workflow_id = ?1 AND seq = ?2",
                params![workflow_id, target_seq],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::CheckpointNotFound { workflow_id: workflow_id.to_string(), seq: target_seq },
                other => StoreError::Database(anyhow::anyhow!(other.to_string())),
            })?;
        let restored: Workflow = serde_json::from_str(&snapshot_json).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.save(&restored)?;
        self.conn
            .execute(
                "UPDATE workflows SET current_checkpoint_seq = ?2 WHERE id = ?1",
                params![workflow_id, target_seq],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(restored)
    }

    /// Returns the id of the first task still `in_progress`, if any (§5
    /// "rollback is rejected with BUSY").
    fn find_in_progress_task(&self, workflow_id: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT id FROM tasks WHERE workflow_id = ?1 AND status = 'in_progress' LIMIT 1",
                params![workflow_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Database(anyhow::anyhow!(other.to_string()))),
            })
    }

    pub fn list_checkpoints(&self, workflow_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT workflow_id, seq, snapshot, created_at FROM checkpoints WHERE workflow_id = ?1 ORDER BY seq")
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let rows = stmt
            .query_map(params![workflow_id], |row| {
                let snapshot_json: String = row.get(2)?;
                let created_at_str: String = row.get(3)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, snapshot_json, created_at_str))
            })
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        let mut checkpoints = Vec::new();
        for row in rows {
            let (workflow_id, seq, snapshot_json, created_at_str) = row.map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
            let snapshot: Workflow = serde_json::from_str(&snapshot_json).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
            let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            checkpoints.push(Checkpoint { workflow_id, seq, snapshot, timestamp });
        }
        Ok(checkpoints)
    }

    // ── Budget records ───────────────────────────────────────────────

    pub fn record_budget(
        &self,
        workflow_id: &str,
        task_id: &str,
        agent_id: &str,
        cost_units: f64,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO budget_records (workflow_id, task_id, agent_id, cost_units, duration_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![workflow_id, task_id, agent_id, cost_units, duration_ms as i64],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    // ── Review decisions ───────────────────────────────────────────────

    pub fn record_review_decision(&self, workflow_id: &str, decision: &ReviewDecision) -> Result<(), StoreError> {
        let payload = serde_json::to_string(decision).map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        self.conn
            .execute(
                "INSERT INTO review_decisions (workflow_id, phase, decision, payload) VALUES (?1, ?2, ?3, ?4)",
                params![workflow_id, decision.phase, format!("{:?}", decision.decision), payload],
            )
            .map_err(|e| StoreError::Database(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }
}

fn mode_to_str(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Interactive => "interactive",
        ExecutionMode::Autonomous => "autonomous",
    }
}

fn mode_from_str(s: &str) -> ExecutionMode {
    match s {
        "autonomous" => ExecutionMode::Autonomous,
        _ => ExecutionMode::Interactive,
    }
}

fn output_type_to_str(t: PhaseOutputType) -> &'static str {
    match t {
        PhaseOutputType::Plan => "plan",
        PhaseOutputType::ImplementationResult => "implementation_result",
        PhaseOutputType::CursorFeedback => "cursor_feedback",
        PhaseOutputType::GeminiFeedback => "gemini_feedback",
        PhaseOutputType::ValidationConsolidated => "validation_consolidated",
        PhaseOutputType::VerificationConsolidated => "verification_consolidated",
    }
}

fn priority_to_str(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

fn priority_from_str(s: &str) -> Priority {
    match s {
        "low" => Priority::Low,
        "high" => Priority::High,
        "critical" => Priority::Critical,
        _ => Priority::Medium,
    }
}

fn task_status_to_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Blocked => "blocked",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Retry => "retry",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn task_status_from_str(s: &str) -> TaskStatus {
    match s {
        "blocked" => TaskStatus::Blocked,
        "in_progress" => TaskStatus::InProgress,
        "retry" => TaskStatus::Retry,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn row_to_workflow(row: &rusqlite::Row) -> rusqlite::Result<Workflow> {
    let id: String = row.get(0)?;
    let project_id: String = row.get(1)?;
    let phase_num: u8 = row.get(2)?;
    let mode_str: String = row.get(3)?;
    let plan_ref: Option<String> = row.get(4)?;
    let task_set_ref: Option<String> = row.get(5)?;
    let pending_interrupt_json: Option<String> = row.get(6)?;
    let iteration_count: u32 = row.get(7)?;
    let iteration_cap: u32 = row.get(8)?;
    let feature_branch: String = row.get(9)?;
    let phase_status_json: String = row.get(10)?;
    let cancelled: i64 = row.get(11)?;
    let last_updated_str: String = row.get(12)?;
    let skip_validation: i64 = row.get(13)?;

    let phase_status = serde_json::from_str(&phase_status_json).unwrap_or_default();
    let pending_interrupt = pending_interrupt_json.and_then(|j| serde_json::from_str(&j).ok());
    let last_updated = chrono::DateTime::parse_from_rfc3339(&last_updated_str)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());

    Ok(Workflow {
        id,
        project_id,
        current_phase: Phase::from_number(phase_num).unwrap_or(Phase::Planning),
        phase_status,
        execution_mode: mode_from_str(&mode_str),
        plan_ref,
        task_set_ref,
        pending_interrupt,
        iteration_count,
        iteration_cap,
        feature_branch,
        last_updated,
        cancelled: cancelled != 0,
        skip_validation: skip_validation != 0,
    })
}

fn row_to_phase_output(row: &rusqlite::Row) -> rusqlite::Result<PhaseOutput> {
    let id: i64 = row.get(0)?;
    let workflow_id: String = row.get(1)?;
    let phase: u8 = row.get(2)?;
    let output_type_str: String = row.get(3)?;
    let payload_json: String = row.get(4)?;
    let producing_agent: String = row.get(5)?;
    let seq: i64 = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    let output_type = match output_type_str.as_str() {
        "implementation_result" => PhaseOutputType::ImplementationResult,
        "cursor_feedback" => PhaseOutputType::CursorFeedback,
        "gemini_feedback" => PhaseOutputType::GeminiFeedback,
        "validation_consolidated" => PhaseOutputType::ValidationConsolidated,
        "verification_consolidated" => PhaseOutputType::VerificationConsolidated,
        _ => PhaseOutputType::Plan,
    };
    let payload = serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null);
    let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());

    Ok(PhaseOutput { id, workflow_id, phase, output_type, payload, producing_agent, timestamp, seq })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let user_story: String = row.get(2)?;
    let acceptance_json: String = row.get(3)?;
    let creates_json: String = row.get(4)?;
    let modifies_json: String = row.get(5)?;
    let deps_json: String = row.get(6)?;
    let priority_str: String = row.get(7)?;
    let complexity_score: f64 = row.get(8)?;
    let status_str: String = row.get(9)?;
    let attempt_count: u32 = row.get(10)?;
    let last_error_json: Option<String> = row.get(11)?;
    let worktree_path: Option<String> = row.get(12)?;

    Ok(Task {
        id,
        title,
        user_story,
        acceptance_criteria: serde_json::from_str(&acceptance_json).unwrap_or_default(),
        files_to_create: serde_json::from_str(&creates_json).unwrap_or_default(),
        files_to_modify: serde_json::from_str(&modifies_json).unwrap_or_default(),
        dependencies: serde_json::from_str(&deps_json).unwrap_or_default(),
        priority: priority_from_str(&priority_str),
        complexity_score,
        status: task_status_from_str(&status_str),
        attempt_count,
        last_error: last_error_json.and_then(|j| serde_json::from_str(&j).ok()),
        worktree_path: worktree_path.map(std::path::PathBuf::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::arbiter::{DecisionKind, DecisionSource};

    fn new_store() -> WorkflowStore {
        WorkflowStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_then_load_round_trips_workflow() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Interactive);
        store.create(&workflow).unwrap();
        let loaded = store.load("w1").unwrap();
        assert_eq!(loaded.id, "w1");
        assert_eq!(loaded.current_phase, Phase::Planning);
    }

    #[test]
    fn load_missing_workflow_returns_not_found() {
        let store = new_store();
        let err = store.load("ghost").unwrap_err();
        assert!(matches!(err, StoreError::WorkflowNotFound(_)));
    }

    #[test]
    fn append_phase_output_assigns_increasing_sequence_numbers() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let seq0 = store
            .append_phase_output("w1", Phase::Planning, PhaseOutputType::Plan, &serde_json::json!({"v": 1}), "writer")
            .unwrap();
        let seq1 = store
            .append_phase_output("w1", Phase::Planning, PhaseOutputType::Plan, &serde_json::json!({"v": 2}), "writer")
            .unwrap();
        assert_eq!(seq0, 0);
        assert_eq!(seq1, 1);
        let outputs = store.query_by_type("w1", PhaseOutputType::Plan).unwrap();
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn rollback_restores_prior_snapshot_without_deleting_outputs() {
        let store = new_store();
        let mut workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let checkpoint0 = store.checkpoint(&workflow).unwrap();

        store
            .append_phase_output("w1", Phase::Planning, PhaseOutputType::Plan, &serde_json::json!({"v": 1}), "writer")
            .unwrap();
        workflow.current_phase = Phase::Validation;
        workflow.set_status(Phase::Planning, PhaseStatus::Completed);
        store.save(&workflow).unwrap();
        store.checkpoint(&workflow).unwrap();

        let restored = store.rollback("w1", checkpoint0).unwrap();
        assert_eq!(restored.current_phase, Phase::Planning);

        let outputs = store.query_by_type("w1", PhaseOutputType::Plan).unwrap();
        assert_eq!(outputs.len(), 1, "rollback must not delete append-only phase outputs");
    }

    #[test]
    fn rollback_to_unknown_checkpoint_errors() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let err = store.rollback("w1", 99).unwrap_err();
        assert!(matches!(err, StoreError::CheckpointNotFound { .. }));
    }

    #[test]
    fn rollback_rejected_while_a_task_is_in_progress() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let checkpoint0 = store.checkpoint(&workflow).unwrap();

        let mut task = Task::new("T1", "in flight");
        task.status = TaskStatus::InProgress;
        store.upsert_task("w1", &task).unwrap();

        let err = store.rollback("w1", checkpoint0).unwrap_err();
        assert!(matches!(err, StoreError::RollbackBusy { task_id } if task_id == "T1"));
    }

    #[test]
    fn upsert_task_then_list_round_trips_fields() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let mut task = Task::new("T1", "build the thing");
        task.dependencies = vec!["T0".to_string()];
        task.priority = Priority::High;
        store.upsert_task("w1", &task).unwrap();

        let tasks = store.list_tasks("w1").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].dependencies, vec!["T0".to_string()]);
        assert_eq!(tasks[0].priority, Priority::High);

        task.status = TaskStatus::Completed;
        store.upsert_task("w1", &task).unwrap();
        let tasks = store.list_tasks("w1").unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn record_review_decision_persists_without_error() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let decision = ReviewDecision {
            phase: 2,
            security_score: 8.0,
            architecture_score: 8.0,
            combined_score: 8.0,
            blocking_issues: Vec::new(),
            decision: DecisionKind::Approved,
            source: DecisionSource::Conservative,
            fix_tasks: Vec::new(),
            partial: None,
        };
        store.record_review_decision("w1", &decision).unwrap();
    }

    #[test]
    fn find_active_by_project_returns_none_with_no_workflows() {
        let store = new_store();
        assert!(store.find_active_by_project("proj1").unwrap().is_none());
    }

    #[test]
    fn find_active_by_project_returns_the_non_terminal_workflow() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        let found = store.find_active_by_project("proj1").unwrap().unwrap();
        assert_eq!(found.id, "w1");
    }

    #[test]
    fn find_active_by_project_ignores_completed_workflows() {
        let store = new_store();
        let mut workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        workflow.current_phase = Phase::Completion;
        workflow.set_status(Phase::Completion, PhaseStatus::Completed);
        store.create(&workflow).unwrap();
        assert!(store.find_active_by_project("proj1").unwrap().is_none());
    }

    #[test]
    fn current_checkpoint_seq_starts_at_zero_and_advances() {
        let store = new_store();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        store.create(&workflow).unwrap();
        assert_eq!(store.current_checkpoint_seq("w1").unwrap(), 0);
        store.checkpoint(&workflow).unwrap();
        assert_eq!(store.current_checkpoint_seq("w1").unwrap(), 0);
        store.checkpoint(&workflow).unwrap();
        assert_eq!(store.current_checkpoint_seq("w1").unwrap(), 1);
    }
}
