//! `resume(workflow_id, decision?)` (§6.1): applies a human decision to a
//! paused workflow and resumes the run loop.

use super::{exit_code_for_open_error, exit_code_for_workflow, exit_code_for_workflow_error, open_driver};
use crate::gates::prompt_resume_decision;
use crate::phase::ResumeDecision;
use anyhow::Result;
use std::path::Path;

pub struct ResumeResponse {
    pub workflow_id: String,
    pub exit_code: i32,
}

/// `decision: None` means the caller wants this function to prompt a human
/// for the choice (the CLI path); a caller that already knows the decision
/// (e.g. the dashboard) passes it directly and the gate is never consulted.
///
/// §8: resuming a workflow with no `pending_interrupt` is a no-op.
pub async fn cmd_resume(project_dir: &Path, workflow_id: &str, decision: Option<ResumeDecision>) -> Result<ResumeResponse> {
    let (driver, mut budget) = match open_driver(project_dir) {
        Ok(pair) => pair,
        Err(err) => {
            return Ok(ResumeResponse {
                workflow_id: workflow_id.to_string(),
                exit_code: exit_code_for_open_error(&err),
            });
        }
    };

    let workflow = driver.store().load(workflow_id)?;
    let Some(interrupt) = workflow.pending_interrupt.clone() else {
        return Ok(ResumeResponse {
            workflow_id: workflow_id.to_string(),
            exit_code: exit_code_for_workflow(&workflow),
        });
    };

    let decision = match decision {
        Some(d) => d,
        None => prompt_resume_decision(&interrupt)?,
    };

    match driver.resume(workflow_id, decision, &mut budget).await {
        Ok(workflow) => Ok(ResumeResponse {
            exit_code: exit_code_for_workflow(&workflow),
            workflow_id: workflow_id.to_string(),
        }),
        Err(err) => Ok(ResumeResponse {
            exit_code: exit_code_for_workflow_error(&err),
            workflow_id: workflow_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::open_driver;
    use crate::phase::ExecutionMode;
    use crate::workflow::Workflow;
    use tempfile::tempdir;

    #[tokio::test]
    async fn resume_without_pending_interrupt_is_a_no_op() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        {
            let (driver, _budget) = open_driver(dir.path()).unwrap();
            let workflow = Workflow::new("w1", "proj1", ExecutionMode::Interactive);
            driver.start(&workflow, "add widgets").unwrap();
        }
        let response = cmd_resume(dir.path(), "w1", Some(ResumeDecision::Proceed)).await.unwrap();
        assert_eq!(response.workflow_id, "w1");
    }
}
