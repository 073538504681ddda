//! `cancel(workflow_id)` (§6.1, §5 "Cancellation and timeout"): a
//! cooperative stop. Because the state machine advances one node at a
//! time and nothing runs between driver steps, marking the workflow
//! cancelled here is sufficient — the next `run`/`resume` call sees
//! `is_terminal()` and stops without executing another node. In-flight
//! task workers (if any were mid-step) finish and record their output
//! before the next step observes the cancellation.

use super::{exit_code_for_open_error, exit_code_for_store_error, exit_code_for_workflow, open_driver};
use anyhow::Result;
use std::path::Path;

pub struct CancelResponse {
    pub workflow_id: String,
    pub exit_code: i32,
}

pub fn cmd_cancel(project_dir: &Path, workflow_id: &str) -> Result<CancelResponse> {
    let (driver, _budget) = match open_driver(project_dir) {
        Ok(pair) => pair,
        Err(err) => {
            return Ok(CancelResponse {
                workflow_id: workflow_id.to_string(),
                exit_code: exit_code_for_open_error(&err),
            });
        }
    };

    let mut workflow = match driver.store().load(workflow_id) {
        Ok(w) => w,
        Err(err) => {
            return Ok(CancelResponse {
                workflow_id: workflow_id.to_string(),
                exit_code: exit_code_for_store_error(&err),
            });
        }
    };

    workflow.cancelled = true;
    driver.store().save(&workflow)?;
    driver.store().checkpoint(&workflow)?;
    tracing::info!(workflow_id = %workflow_id, "workflow cancelled");

    Ok(CancelResponse {
        workflow_id: workflow_id.to_string(),
        exit_code: exit_code_for_workflow(&workflow),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::open_driver;
    use crate::phase::ExecutionMode;
    use crate::workflow::Workflow;
    use tempfile::tempdir;

    #[test]
    fn cancel_marks_workflow_terminal() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        {
            let (driver, _budget) = open_driver(dir.path()).unwrap();
            let workflow = Workflow::new("w1", "proj1", ExecutionMode::Interactive);
            driver.start(&workflow, "add widgets").unwrap();
        }

        cmd_cancel(dir.path(), "w1").unwrap();

        let (driver, _budget) = open_driver(dir.path()).unwrap();
        let reloaded = driver.store().load("w1").unwrap();
        assert!(reloaded.is_terminal());
        assert!(reloaded.cancelled);
    }

    #[test]
    fn cancel_on_unknown_workflow_does_not_panic() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        let response = cmd_cancel(dir.path(), "ghost").unwrap();
        assert_eq!(response.exit_code, crate::cmd::EXIT_FAILED);
    }
}
