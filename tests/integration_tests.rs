//! End-to-end tests for the `conductor` CLI, driven through the real
//! binary the way the teacher's `integration_tests.rs` drives `forge`.
//!
//! None of these tests depend on a real `claude` binary being on PATH:
//! every `start` invocation points `agent.claude_cmd` at a path that
//! cannot exist, so the one Planning invocation each test triggers fails
//! fast on spawn (ENOENT) rather than shelling out to anything real or
//! hanging on a network call.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn conductor() -> Command {
    cargo_bin_cmd!("conductor")
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Seeds `.conductor/conductor.toml` with an agent command that cannot
/// possibly spawn, so a `start` against this project directory fails the
/// Planning phase deterministically and quickly instead of depending on
/// (or shelling out to) a real agent CLI.
fn pin_agent_to_missing_binary(dir: &TempDir) {
    fs::create_dir_all(dir.path().join(".conductor")).unwrap();
    fs::write(
        dir.path().join(".conductor").join("conductor.toml"),
        "[agent]\nclaude_cmd = \"/nonexistent/conductor-test-agent-binary\"\nsoft_timeout_secs = 2\nhard_timeout_secs = 2\n",
    )
    .unwrap();
}

mod cli_basics {
    use super::*;

    #[test]
    fn help_lists_all_subcommands() {
        conductor()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("start"))
            .stdout(predicate::str::contains("resume"))
            .stdout(predicate::str::contains("status"))
            .stdout(predicate::str::contains("rollback"))
            .stdout(predicate::str::contains("cancel"));
    }

    #[test]
    fn version_flag_succeeds() {
        conductor().arg("--version").assert().success();
    }

    #[test]
    fn start_without_a_brief_is_a_usage_error() {
        let dir = create_temp_project();
        conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1"])
            .assert()
            .failure();
    }

    #[test]
    fn status_of_an_unknown_workflow_reports_failure() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        conductor()
            .current_dir(dir.path())
            .args(["status", "ghost"])
            .assert()
            .code(3);
    }
}

mod start_and_status {
    use super::*;

    #[test]
    fn start_registers_a_workflow_and_fails_fast_without_an_agent() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);

        let assert = conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();
        let output = assert.get_output();
        assert_eq!(output.status.code(), Some(3));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("workflow_id: wf-"));
    }

    #[test]
    fn start_reads_the_brief_from_a_file() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);
        let brief_path = dir.path().join("brief.txt");
        fs::write(&brief_path, "add a login form").unwrap();

        conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief-file"])
            .arg(&brief_path)
            .args(["--autonomous"])
            .assert()
            .code(3);
    }

    #[test]
    fn starting_the_same_project_twice_reuses_the_workflow_id() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);

        let first = conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();
        let first_stdout = String::from_utf8_lossy(&first.get_output().stdout).to_string();
        let workflow_id = first_stdout
            .lines()
            .find(|l| l.starts_with("workflow_id:"))
            .unwrap()
            .to_string();

        let second = conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();
        let second_stdout = String::from_utf8_lossy(&second.get_output().stdout).to_string();
        assert!(second_stdout.contains(&workflow_id));
    }

    #[test]
    fn status_after_a_failed_start_shows_planning_and_a_failed_exit_code() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);

        let start = conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();
        let stdout = String::from_utf8_lossy(&start.get_output().stdout).to_string();
        let workflow_id = stdout
            .lines()
            .find(|l| l.starts_with("workflow_id:"))
            .unwrap()
            .trim_start_matches("workflow_id:")
            .trim()
            .to_string();

        conductor()
            .current_dir(dir.path())
            .args(["status", &workflow_id])
            .assert()
            .success()
            .stdout(predicate::str::contains("current_phase:    1 (planning)"));
    }
}

mod rollback_and_cancel {
    use super::*;

    #[test]
    fn rollback_to_an_unknown_checkpoint_fails_without_panicking() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);
        conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();

        conductor()
            .current_dir(dir.path())
            .args(["rollback", "ghost", "999"])
            .assert()
            .code(3);
    }

    #[test]
    fn cancel_on_an_unknown_workflow_fails_without_panicking() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        conductor()
            .current_dir(dir.path())
            .args(["cancel", "ghost"])
            .assert()
            .code(3);
    }

    #[test]
    fn cancel_marks_a_started_workflow_terminal() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);

        let start = conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();
        let stdout = String::from_utf8_lossy(&start.get_output().stdout).to_string();
        let workflow_id = stdout
            .lines()
            .find(|l| l.starts_with("workflow_id:"))
            .unwrap()
            .trim_start_matches("workflow_id:")
            .trim()
            .to_string();

        conductor()
            .current_dir(dir.path())
            .args(["cancel", &workflow_id])
            .assert()
            .stdout(predicate::str::contains("cancelled"));

        conductor()
            .current_dir(dir.path())
            .args(["status", &workflow_id])
            .assert()
            .stdout(predicate::str::contains("planning"));
    }
}

mod resume_flow {
    use super::*;

    #[test]
    fn resume_without_a_pending_interrupt_is_a_no_op() {
        let dir = create_temp_project();
        pin_agent_to_missing_binary(&dir);

        let start = conductor()
            .current_dir(dir.path())
            .args(["start", "--project", "proj1", "--brief", "add widgets", "--autonomous"])
            .assert();
        let stdout = String::from_utf8_lossy(&start.get_output().stdout).to_string();
        let workflow_id = stdout
            .lines()
            .find(|l| l.starts_with("workflow_id:"))
            .unwrap()
            .trim_start_matches("workflow_id:")
            .trim()
            .to_string();

        // A workflow that died mid-Planning has no pending interrupt, so
        // resume reports its current (failed) state rather than hanging on
        // the interactive prompt.
        conductor()
            .current_dir(dir.path())
            .args(["resume", &workflow_id, "--decision", "proceed"])
            .assert()
            .stdout(predicate::str::contains(&workflow_id));
    }
}
