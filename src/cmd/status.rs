//! `status(workflow_id)` (§6.1): reports current phase, per-phase status,
//! pending interrupt, and iteration counter without running the driver.

use super::{exit_code_for_open_error, exit_code_for_store_error, exit_code_for_workflow, open_driver};
use crate::phase::{Phase, PhaseStatus};
use anyhow::Result;
use std::path::Path;

pub struct StatusReport {
    pub workflow_id: String,
    pub current_phase: Phase,
    pub phase_status: Vec<(Phase, PhaseStatus)>,
    pub pending_interrupt: Option<String>,
    pub iteration_count: u32,
    pub iteration_cap: u32,
    pub checkpoint_seq: i64,
    pub exit_code: i32,
}

pub fn cmd_status(project_dir: &Path, workflow_id: &str) -> Result<StatusReport> {
    let (driver, _budget) = match open_driver(project_dir) {
        Ok(pair) => pair,
        Err(err) => return Ok(empty_report(workflow_id, exit_code_for_open_error(&err))),
    };
    let store = driver.store();
    let workflow = match store.load(workflow_id) {
        Ok(w) => w,
        Err(err) => return Ok(empty_report(workflow_id, exit_code_for_store_error(&err))),
    };
    let checkpoint_seq = store.current_checkpoint_seq(workflow_id)?;

    Ok(StatusReport {
        workflow_id: workflow_id.to_string(),
        current_phase: workflow.current_phase,
        phase_status: Phase::ALL.iter().map(|p| (*p, workflow.status_of(*p))).collect(),
        pending_interrupt: workflow.pending_interrupt.as_ref().map(|i| {
            format!("{:?} at phase {} ({}): {}", i.interrupt_type, i.phase.number(), i.phase, i.reason)
        }),
        iteration_count: workflow.iteration_count,
        iteration_cap: workflow.iteration_cap,
        checkpoint_seq,
        exit_code: exit_code_for_workflow(&workflow),
    })
}

fn empty_report(workflow_id: &str, exit_code: i32) -> StatusReport {
    StatusReport {
        workflow_id: workflow_id.to_string(),
        current_phase: Phase::Planning,
        phase_status: Vec::new(),
        pending_interrupt: None,
        iteration_count: 0,
        iteration_cap: 0,
        checkpoint_seq: 0,
        exit_code,
    }
}
