//! `start(project, {start_phase, end_phase, skip_validation, autonomous})`
//! (§6.1): registers a new workflow and drives it until it pauses or
//! reaches a terminal state.

use super::{exit_code_for_open_error, exit_code_for_workflow, exit_code_for_workflow_error, open_driver};
use crate::phase::{ExecutionMode, Phase};
use crate::workflow::Workflow;
use anyhow::Result;
use std::path::Path;

pub struct StartRequest {
    pub project: String,
    pub feature_brief: String,
    pub start_phase: Option<Phase>,
    pub end_phase: Option<Phase>,
    pub skip_validation: bool,
    pub autonomous: bool,
}

pub struct StartResponse {
    pub accepted: bool,
    pub workflow_id: String,
    pub exit_code: i32,
}

/// Idempotent on `project`: a project with an active (non-terminal,
/// non-cancelled) workflow already running returns that workflow's id
/// without creating a second one or mutating its state (§8 "`start` on an
/// already-started workflow returns the existing id without mutating
/// state").
pub async fn cmd_start(project_dir: &Path, request: StartRequest) -> Result<StartResponse> {
    let (driver, mut budget) = match open_driver(project_dir) {
        Ok(pair) => pair,
        Err(err) => {
            return Ok(StartResponse {
                accepted: false,
                workflow_id: String::new(),
                exit_code: exit_code_for_open_error(&err),
            });
        }
    };

    if let Some(existing) = driver.store().find_active_by_project(&request.project)? {
        tracing::info!(workflow_id = %existing.id, project = %request.project, "start is idempotent, reusing active workflow");
        return Ok(StartResponse {
            accepted: true,
            exit_code: exit_code_for_workflow(&existing),
            workflow_id: existing.id,
        });
    }

    let workflow_id = format!("wf-{}", uuid::Uuid::new_v4());
    let mode = if request.autonomous { ExecutionMode::Autonomous } else { ExecutionMode::Interactive };
    let mut workflow = Workflow::new(&workflow_id, &request.project, mode);
    workflow.current_phase = request.start_phase.unwrap_or(Phase::Planning);
    workflow.skip_validation = request.skip_validation;

    driver.start(&workflow, &request.feature_brief)?;
    tracing::info!(workflow_id = %workflow_id, project = %request.project, "workflow accepted");

    match driver.run_until(&workflow_id, &mut budget, request.end_phase).await {
        Ok(workflow) => Ok(StartResponse {
            accepted: true,
            exit_code: exit_code_for_workflow(&workflow),
            workflow_id,
        }),
        Err(err) => Ok(StartResponse {
            accepted: true,
            exit_code: exit_code_for_workflow_error(&err),
            workflow_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn request(project: &str, brief: &str) -> StartRequest {
        StartRequest {
            project: project.to_string(),
            feature_brief: brief.to_string(),
            start_phase: None,
            end_phase: Some(Phase::Planning),
            skip_validation: false,
            autonomous: true,
        }
    }

    /// Points `claude_cmd` at a binary that cannot possibly exist, so the
    /// one planning invocation these tests trigger fails fast on spawn
    /// instead of depending on (or shelling out to) a real agent CLI.
    fn pin_agent_to_missing_binary(project_dir: &Path) {
        std::fs::create_dir_all(project_dir.join(".conductor")).unwrap();
        std::fs::write(
            project_dir.join(".conductor").join("conductor.toml"),
            "[agent]\nclaude_cmd = \"/nonexistent/conductor-test-agent-binary\"\nsoft_timeout_secs = 2\nhard_timeout_secs = 2\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn start_is_accepted_even_when_the_agent_invocation_fails() {
        let dir = tempdir().unwrap();
        pin_agent_to_missing_binary(dir.path());
        let response = cmd_start(dir.path(), request("proj1", "add widgets")).await.unwrap();
        assert!(response.accepted);
        assert!(response.workflow_id.starts_with("wf-"));
    }

    #[tokio::test]
    async fn start_twice_for_the_same_project_is_idempotent() {
        let dir = tempdir().unwrap();
        pin_agent_to_missing_binary(dir.path());
        let first = cmd_start(dir.path(), request("proj1", "add widgets")).await.unwrap();
        let second = cmd_start(dir.path(), request("proj1", "add widgets")).await.unwrap();
        assert_eq!(first.workflow_id, second.workflow_id);
    }

    #[tokio::test]
    async fn start_for_a_different_project_gets_a_distinct_workflow() {
        let dir = tempdir().unwrap();
        pin_agent_to_missing_binary(dir.path());
        let first = cmd_start(dir.path(), request("proj1", "add widgets")).await.unwrap();
        let second = cmd_start(dir.path(), request("proj2", "add gadgets")).await.unwrap();
        assert_ne!(first.workflow_id, second.workflow_id);
    }
}
