//! Workflow data model (§3 "Workflow", "Phase Output", "Checkpoint").

use crate::phase::{ExecutionMode, Phase, PhaseStatus, PendingInterrupt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A run of the five-phase lifecycle for one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub project_id: String,
    pub current_phase: Phase,
    pub phase_status: HashMap<String, PhaseStatus>,
    pub execution_mode: ExecutionMode,
    pub plan_ref: Option<String>,
    pub task_set_ref: Option<String>,
    pub pending_interrupt: Option<PendingInterrupt>,
    pub iteration_count: u32,
    pub iteration_cap: u32,
    pub feature_branch: String,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub cancelled: bool,
    /// Set by `start(..., skip_validation)` (§6.1): Phase 2 is marked
    /// completed the moment Planning finishes instead of dispatching
    /// reviewers over the plan.
    pub skip_validation: bool,
}

impl Workflow {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, mode: ExecutionMode) -> Self {
        let id = id.into();
        let mut phase_status = HashMap::new();
        for phase in Phase::ALL {
            phase_status.insert(phase.to_string(), PhaseStatus::Pending);
        }
        Self {
            feature_branch: format!("conductor/{id}"),
            id,
            project_id: project_id.into(),
            current_phase: Phase::Planning,
            phase_status,
            execution_mode: mode,
            plan_ref: None,
            task_set_ref: None,
            pending_interrupt: None,
            iteration_count: 0,
            iteration_cap: 50,
            last_updated: chrono::Utc::now(),
            cancelled: false,
            skip_validation: false,
        }
    }

    /// Terminal when phase 5 is completed, or the iteration cap is exceeded.
    pub fn is_terminal(&self) -> bool {
        self.cancelled
            || self.iteration_count > self.iteration_cap
            || self.phase_status.get(&Phase::Completion.to_string()) == Some(&PhaseStatus::Completed)
    }

    pub fn status_of(&self, phase: Phase) -> PhaseStatus {
        self.phase_status.get(&phase.to_string()).copied().unwrap_or(PhaseStatus::Pending)
    }

    pub fn set_status(&mut self, phase: Phase, status: PhaseStatus) {
        self.phase_status.insert(phase.to_string(), status);
        self.last_updated = chrono::Utc::now();
    }
}

/// An opaque, typed artifact produced by a node, consumed by a later node
/// or by operators. Append-only; previous entries of the same type remain
/// visible after rollback (invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutputType {
    Plan,
    ImplementationResult,
    CursorFeedback,
    GeminiFeedback,
    ValidationConsolidated,
    VerificationConsolidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub id: i64,
    pub workflow_id: String,
    pub phase: u8,
    pub output_type: PhaseOutputType,
    pub payload: serde_json::Value,
    pub producing_agent: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Append sequence within (workflow_id, output_type); used to totally
    /// order outputs of the same type and to re-establish a prefix on
    /// rollback.
    pub seq: i64,
}

/// An immutable snapshot of Workflow + materialised phase outputs, taken
/// after every state-machine transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: String,
    pub seq: i64,
    pub snapshot: Workflow,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workflow_starts_at_planning_and_pending() {
        let w = Workflow::new("w1", "proj1", ExecutionMode::Interactive);
        assert_eq!(w.current_phase, Phase::Planning);
        assert_eq!(w.status_of(Phase::Planning), PhaseStatus::Pending);
        assert!(!w.is_terminal());
    }

    #[test]
    fn is_terminal_when_completion_completed() {
        let mut w = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        w.set_status(Phase::Completion, PhaseStatus::Completed);
        assert!(w.is_terminal());
    }

    #[test]
    fn is_terminal_when_iteration_cap_exceeded() {
        let mut w = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        w.iteration_count = 51;
        assert!(w.is_terminal());
    }
}
