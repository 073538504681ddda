//! `rollback(workflow_id, checkpoint_seq)` (§4.4, §6.1): makes a prior
//! checkpoint current without deleting any phase output recorded after it
//! (invariant 6).

use super::{exit_code_for_open_error, exit_code_for_store_error, exit_code_for_workflow, open_driver};
use crate::phase::Phase;
use anyhow::Result;
use std::path::Path;

pub struct RollbackResponse {
    pub workflow_id: String,
    pub restored_phase: Phase,
    pub checkpoint_seq: i64,
    pub exit_code: i32,
}

/// Rejected with `BUSY` (surfaced as `StoreError::RollbackBusy`, mapped to
/// the ordinary failure exit code since the spec does not carve out a
/// distinct code for it) when a task is still `in_progress` (§5).
pub fn cmd_rollback(project_dir: &Path, workflow_id: &str, checkpoint_seq: i64) -> Result<RollbackResponse> {
    let (driver, _budget) = match open_driver(project_dir) {
        Ok(pair) => pair,
        Err(err) => {
            return Ok(RollbackResponse {
                workflow_id: workflow_id.to_string(),
                restored_phase: Phase::Planning,
                checkpoint_seq,
                exit_code: exit_code_for_open_error(&err),
            });
        }
    };

    match driver.store().rollback(workflow_id, checkpoint_seq) {
        Ok(restored) => Ok(RollbackResponse {
            workflow_id: workflow_id.to_string(),
            restored_phase: restored.current_phase,
            checkpoint_seq,
            exit_code: exit_code_for_workflow(&restored),
        }),
        Err(err) => Ok(RollbackResponse {
            workflow_id: workflow_id.to_string(),
            restored_phase: Phase::Planning,
            checkpoint_seq,
            exit_code: exit_code_for_store_error(&err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::open_driver;
    use crate::phase::{ExecutionMode, PhaseStatus};
    use crate::workflow::Workflow;
    use tempfile::tempdir;

    #[test]
    fn rollback_restores_an_earlier_checkpoint() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        let checkpoint0 = {
            let (driver, _budget) = open_driver(dir.path()).unwrap();
            let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
            driver.start(&workflow, "add widgets").unwrap();
            driver.store().checkpoint(&workflow).unwrap();

            let mut advanced = workflow.clone();
            advanced.current_phase = Phase::Validation;
            advanced.set_status(Phase::Planning, PhaseStatus::Completed);
            driver.store().save(&advanced).unwrap();
            driver.store().checkpoint(&advanced).unwrap();
            0
        };

        let response = cmd_rollback(dir.path(), "w1", checkpoint0).unwrap();
        assert_eq!(response.restored_phase, Phase::Planning);
    }

    #[test]
    fn rollback_to_unknown_checkpoint_does_not_panic() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        {
            let (driver, _budget) = open_driver(dir.path()).unwrap();
            let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
            driver.start(&workflow, "add widgets").unwrap();
        }
        let response = cmd_rollback(dir.path(), "w1", 999).unwrap();
        assert_eq!(response.exit_code, crate::cmd::EXIT_FAILED);
    }
}
