//! CLI command implementations (§6.1, C9).
//!
//! Each submodule owns one control-surface operation:
//!
//! | Module     | Operation handled   |
//! |------------|----------------------|
//! | `start`    | `start`              |
//! | `resume`   | `resume`             |
//! | `status`   | `status`             |
//! | `rollback` | `rollback`           |
//! | `cancel`   | `cancel`             |
//!
//! One function per subcommand, each opening its own store/driver handle
//! from the project directory and printing a human-readable report,
//! returning the process exit code rather than calling
//! `std::process::exit` itself so `main` stays the single place that
//! terminates the process.

pub mod cancel;
pub mod resume;
pub mod rollback;
pub mod start;
pub mod status;

pub use cancel::cmd_cancel;
pub use resume::cmd_resume;
pub use rollback::cmd_rollback;
pub use start::cmd_start;
pub use status::cmd_status;

use crate::agent::{AgentAdapter, AgentConfig};
use crate::budget::BudgetLedger;
use crate::config::ConductorConfig;
use crate::errors::StoreError;
use crate::orchestrator::Driver;
use crate::task::scheduler::SchedulerConfig;
use crate::workflow::WorkflowStore;
use crate::worktree::WorktreeManager;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Exit codes for a CLI wrapping the control surface (§6.1).
pub const EXIT_COMPLETED: i32 = 0;
pub const EXIT_PAUSED: i32 = 2;
pub const EXIT_FAILED: i32 = 3;
pub const EXIT_BUDGET_EXCEEDED: i32 = 4;
pub const EXIT_STORAGE_UNAVAILABLE: i32 = 5;

/// Builds a `Driver` and its `BudgetLedger` from the layered project
/// configuration. Absence of a durable store connection yields
/// `STORAGE_UNAVAILABLE` before any work begins (§6.4), surfaced as exit
/// code 5 by the caller.
pub fn open_driver(project_dir: &Path) -> Result<(Driver, BudgetLedger)> {
    let config = ConductorConfig::load(project_dir).context("failed to load conductor.toml")?;
    std::fs::create_dir_all(project_dir.join(".conductor")).context("failed to create .conductor directory")?;

    let store = WorkflowStore::open(&ConductorConfig::store_path(project_dir))?;

    let agents = AgentAdapter::new(AgentConfig {
        claude_cmd: config.agent.claude_cmd.clone(),
        working_dir: project_dir.to_path_buf(),
        soft_timeout: Duration::from_secs(config.agent.soft_timeout_secs),
        hard_timeout: Duration::from_secs(config.agent.hard_timeout_secs),
        cost_per_invocation: config.agent.cost_per_invocation,
    });

    // A project without a git repository still runs tasks, just without
    // isolated worktrees (driver.rs falls back to direct invocation).
    let worktrees = WorktreeManager::new(project_dir, ConductorConfig::worktrees_root(project_dir)).ok();

    let scheduler_config = SchedulerConfig::default().with_max_parallel(config.scheduling.max_parallel_tasks);
    let driver = Driver::new(store, agents, worktrees, scheduler_config);
    let budget = BudgetLedger::new(config.budget.project_ceiling, config.budget.task_ceiling);
    Ok((driver, budget))
}

/// Maps a driver-loop outcome to the exit code contract of §6.1,
/// classifying a paused-awaiting-input workflow distinctly from one that
/// ran to completion.
pub fn exit_code_for_workflow(workflow: &crate::workflow::Workflow) -> i32 {
    if workflow.pending_interrupt.is_some() {
        return EXIT_PAUSED;
    }
    if workflow.status_of(crate::phase::Phase::Completion) == crate::phase::PhaseStatus::Completed {
        return EXIT_COMPLETED;
    }
    EXIT_FAILED
}

/// Maps a driver-loop `Err` to the exit code contract of §6.1.
pub fn exit_code_for_workflow_error(err: &crate::errors::WorkflowError) -> i32 {
    use crate::errors::{AgentError, StoreError, TaskError, WorkflowError};
    match err {
        WorkflowError::Store(StoreError::StorageUnavailable(_)) => EXIT_STORAGE_UNAVAILABLE,
        WorkflowError::Agent(AgentError::BudgetExceeded { .. }) => EXIT_BUDGET_EXCEEDED,
        WorkflowError::Task(TaskError::BudgetExceeded(_)) => EXIT_BUDGET_EXCEEDED,
        _ => EXIT_FAILED,
    }
}

/// Exit code for a store-only operation (`status`/`rollback`/`cancel`) that
/// never runs the driver loop, so there is no phase outcome to classify —
/// only whether the store itself was reachable.
pub fn exit_code_for_store_error(err: &StoreError) -> i32 {
    match err {
        StoreError::StorageUnavailable(_) => EXIT_STORAGE_UNAVAILABLE,
        _ => EXIT_FAILED,
    }
}

/// Classifies a failure to even open the driver (`open_driver`), which
/// happens before any work begins (§6.4): a store that cannot be reached
/// is `STORAGE_UNAVAILABLE`; anything else (e.g. a malformed
/// `conductor.toml`) is an ordinary failure.
pub fn exit_code_for_open_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            return exit_code_for_store_error(store_err);
        }
    }
    EXIT_FAILED
}
