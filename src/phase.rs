//! The fixed five-phase state machine (C7).
//!
//! Unlike the JSON-loaded, arbitrary-length phase list this module used to
//! describe, Conductor's phase graph is a closed, five-node cycle of
//! Planning → Validation → Implementation → Verification → Completion.
//! Each node carries static metadata (`PhaseNode`) plus per-workflow runtime
//! state (`PhaseStatus`, attempt counters, an optional pending interrupt).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five ordered nodes of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Planning,
    Validation,
    Implementation,
    Verification,
    Completion,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Planning,
        Phase::Validation,
        Phase::Implementation,
        Phase::Verification,
        Phase::Completion,
    ];

    /// The 1-based phase number used in audit output and error messages.
    pub fn number(self) -> u8 {
        match self {
            Phase::Planning => 1,
            Phase::Validation => 2,
            Phase::Implementation => 3,
            Phase::Verification => 4,
            Phase::Completion => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Phase> {
        Self::ALL.into_iter().find(|p| p.number() == n)
    }

    pub fn next(self) -> Option<Phase> {
        Self::from_number(self.number() + 1)
    }

    /// Static metadata describing this node's precondition and action, used
    /// for display and for the driver's dispatch table.
    pub fn node(self) -> PhaseNode {
        match self {
            Phase::Planning => PhaseNode {
                phase: self,
                precondition: "workflow exists; product spec available",
                action: "invoke writer agent with spec -> produce plan (task DAG)",
                max_retries: 3,
            },
            Phase::Validation => PhaseNode {
                phase: self,
                precondition: "plan exists",
                action: "invoke security + architecture reviewers in parallel over the plan, arbitrate",
                max_retries: 3,
            },
            Phase::Implementation => PhaseNode {
                phase: self,
                precondition: "validation approved",
                action: "dispatch writer agent per ready task under TDD contract, run tests",
                max_retries: 3,
            },
            Phase::Verification => PhaseNode {
                phase: self,
                precondition: "implementation completed",
                action: "invoke security + architecture reviewers in parallel over the change set, arbitrate",
                max_retries: 3,
            },
            Phase::Completion => PhaseNode {
                phase: self,
                precondition: "verification approved",
                action: "emit summary artifact; mark workflow terminal",
                max_retries: 0,
            },
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::Validation => "validation",
            Phase::Implementation => "implementation",
            Phase::Verification => "verification",
            Phase::Completion => "completion",
        };
        write!(f, "{name}")
    }
}

/// Static per-phase metadata (§4.1 table).
#[derive(Debug, Clone, Copy)]
pub struct PhaseNode {
    pub phase: Phase,
    pub precondition: &'static str,
    pub action: &'static str,
    pub max_retries: u32,
}

/// Runtime status of one phase within one workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    NeedsFixes,
}

/// Whether the workflow runs with a human in the loop or unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Interactive,
    Autonomous,
}

/// The outcome of executing a phase's action, used by the driver to decide
/// the conditional edge to follow (§4.1 "Conditional Edges" column).
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    /// Planning produced a parseable plan.
    ParseOk,
    /// Planning failed to produce a parseable plan.
    ParseFail(String),
    /// Validation/Verification arbiter decision.
    Approved,
    NeedsChanges { fix_tasks: Vec<String> },
    Rejected,
    Escalated { reason: String },
    /// Implementation: every task reached `completed`.
    AllTasksCompleted,
    /// Implementation: at least one task is `failed`.
    TaskFailed { task_id: String },
}

/// A persistent record that a workflow is paused awaiting an external
/// decision. Reconstructable from the store alone; no implicit
/// continuations (§9 Design Notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub phase: Phase,
    pub interrupt_type: InterruptType,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptType {
    /// Interactive-mode `needs_changes` confirmation before looping back.
    NeedsChangesConfirmation,
    /// Arbiter returned `escalated`.
    Escalation,
    /// A task exhausted its retries in interactive mode.
    TaskFailureConfirmation,
}

/// The human decision supplied to `resume` for a pending interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeDecision {
    /// Proceed with the implied default action (loop back, retry, etc).
    Proceed,
    /// Treat the paused phase as rejected; fail the workflow.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_numbers_are_one_based_and_ordered() {
        assert_eq!(Phase::Planning.number(), 1);
        assert_eq!(Phase::Completion.number(), 5);
        assert_eq!(Phase::from_number(3), Some(Phase::Implementation));
        assert_eq!(Phase::from_number(6), None);
    }

    #[test]
    fn next_advances_through_all_five_then_stops() {
        let mut p = Phase::Planning;
        let mut seen = vec![p];
        while let Some(n) = p.next() {
            seen.push(n);
            p = n;
        }
        assert_eq!(seen, Phase::ALL.to_vec());
    }

    #[test]
    fn completion_has_zero_retries() {
        assert_eq!(Phase::Completion.node().max_retries, 0);
    }

    #[test]
    fn display_is_lowercase_name() {
        assert_eq!(Phase::Validation.to_string(), "validation");
    }
}
