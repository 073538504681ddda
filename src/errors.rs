//! Typed error hierarchy for the Conductor orchestrator.
//!
//! Five enums cover the five subsystems named in the component table:
//! - `AgentError` — external CLI agent invocation failures (C1)
//! - `StoreError` — workflow store durability failures (C2)
//! - `TaskError` — task lifecycle / DAG failures (C5)
//! - `ReviewError` — review arbitration failures (C6)
//! - `WorkflowError` — phase state machine / driver failures (C7/C8), and the
//!   umbrella type the driver routes on.

use thiserror::Error;

/// Errors from the Agent Adapter (C1).
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent process for {capability}: {source}")]
    SpawnFailed {
        capability: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent {agent} exceeded budget ceiling ({estimate} > {ceiling})")]
    BudgetExceeded {
        agent: String,
        estimate: f64,
        ceiling: f64,
    },

    #[error("agent {agent} hit hard timeout after {elapsed_secs}s")]
    HardTimeout { agent: String, elapsed_secs: u64 },

    #[error("agent {agent} exited with code {exit_code} and no valid structured output")]
    AgentError { agent: String, exit_code: i32 },

    #[error("agent {agent} produced output that failed schema validation: {message}")]
    InvalidOutput { agent: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the Workflow Store (C2).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("workflow {0} not found")]
    WorkflowNotFound(String),

    #[error("checkpoint {seq} not found for workflow {workflow_id}")]
    CheckpointNotFound { workflow_id: String, seq: i64 },

    #[error("rollback rejected: task {task_id} is still in_progress")]
    RollbackBusy { task_id: String },

    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the Task Lifecycle Engine (C5).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("cycle detected in task dependency graph: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("task {task} still over split threshold after splitting (score {score})")]
    SplitDidNotConverge { task: String, score: f64 },

    #[error("task {0} has too many files (create > 3 or modify > 5)")]
    FileCapExceeded(String),

    #[error("task {task_id} failed after {attempts} attempts: {message}")]
    AttemptsExhausted {
        task_id: String,
        attempts: u32,
        message: String,
    },

    #[error("budget exceeded for task {0}")]
    BudgetExceeded(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the Review Arbiter (C6).
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("reviewer {reviewer} produced an artifact that failed schema validation: {message}")]
    InvalidArtifact { reviewer: String, message: String },

    #[error("four-eyes violation: {agent} authored and reviewed the same artifact")]
    AuthorIsReviewer { agent: String },

    #[error("reviewer {0} did not respond before its deadline")]
    PartialReview(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the Phase State Machine and Orchestrator Driver (C7/C8).
///
/// This is the umbrella type the driver matches on to classify a failure
/// into the routing categories of the error handling design: transient
/// infrastructure, invalid agent output, policy violation, protocol
/// violation, or human-decision-required.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow store error: {0}")]
    Store(#[from] StoreError),

    #[error("agent invocation failed")]
    Agent(#[from] AgentError),

    #[error("task lifecycle error")]
    Task(#[from] TaskError),

    #[error("review arbitration error")]
    Review(#[from] ReviewError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("iteration cap ({cap}) exceeded for workflow {workflow_id}")]
    IterationCapExceeded { workflow_id: String, cap: u32 },

    #[error("workflow {workflow_id} is paused awaiting human decision: {reason}")]
    PendingInterrupt { workflow_id: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Classify the failure into the driver's routing categories, used to
    /// decide whether to retry, escalate, or fail the workflow outright.
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Store(StoreError::StorageUnavailable(_)) => ErrorCategory::TransientInfrastructure,
            WorkflowError::Store(_) => ErrorCategory::ProtocolViolation,
            WorkflowError::Agent(AgentError::HardTimeout { .. }) => {
                ErrorCategory::TransientInfrastructure
            }
            WorkflowError::Agent(AgentError::InvalidOutput { .. }) => {
                ErrorCategory::InvalidAgentOutput
            }
            WorkflowError::Agent(AgentError::BudgetExceeded { .. }) => {
                ErrorCategory::PolicyViolation
            }
            WorkflowError::Task(TaskError::BudgetExceeded(_)) => ErrorCategory::PolicyViolation,
            WorkflowError::Task(TaskError::CycleDetected(_)) => ErrorCategory::ProtocolViolation,
            WorkflowError::Review(ReviewError::AuthorIsReviewer { .. }) => {
                ErrorCategory::ProtocolViolation
            }
            WorkflowError::ProtocolViolation(_) => ErrorCategory::ProtocolViolation,
            WorkflowError::PendingInterrupt { .. } => ErrorCategory::HumanDecisionRequired,
            _ => ErrorCategory::TransientInfrastructure,
        }
    }
}

/// The five routing buckets from the error handling design (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    TransientInfrastructure,
    InvalidAgentOutput,
    PolicyViolation,
    ProtocolViolation,
    HumanDecisionRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_budget_exceeded_carries_fields() {
        let err = AgentError::BudgetExceeded {
            agent: "writer".into(),
            estimate: 12.5,
            ceiling: 10.0,
        };
        match &err {
            AgentError::BudgetExceeded {
                agent,
                estimate,
                ceiling,
            } => {
                assert_eq!(agent, "writer");
                assert_eq!(*estimate, 12.5);
                assert_eq!(*ceiling, 10.0);
            }
            _ => panic!("expected BudgetExceeded"),
        }
        assert!(err.to_string().contains("writer"));
    }

    #[test]
    fn store_error_rollback_busy_is_matchable() {
        let err = StoreError::RollbackBusy {
            task_id: "T1".into(),
        };
        assert!(matches!(err, StoreError::RollbackBusy { .. }));
    }

    #[test]
    fn workflow_error_category_routes_protocol_violation() {
        let err = WorkflowError::Task(TaskError::CycleDetected(vec!["T1".into(), "T2".into()]));
        assert_eq!(err.category(), ErrorCategory::ProtocolViolation);
    }

    #[test]
    fn workflow_error_category_routes_human_decision() {
        let err = WorkflowError::PendingInterrupt {
            workflow_id: "w1".into(),
            reason: "escalation".into(),
        };
        assert_eq!(err.category(), ErrorCategory::HumanDecisionRequired);
    }

    #[test]
    fn workflow_error_converts_from_store_error() {
        let inner = StoreError::WorkflowNotFound("w1".into());
        let err: WorkflowError = inner.into();
        assert!(matches!(err, WorkflowError::Store(StoreError::WorkflowNotFound(_))));
    }

    #[test]
    fn workflow_error_category_routes_store_unavailable_as_transient() {
        let err: WorkflowError = StoreError::StorageUnavailable("disk full".into()).into();
        assert_eq!(err.category(), ErrorCategory::TransientInfrastructure);
    }

    #[test]
    fn workflow_error_category_routes_workflow_not_found_as_protocol_violation() {
        let err: WorkflowError = StoreError::WorkflowNotFound("w1".into()).into();
        assert_eq!(err.category(), ErrorCategory::ProtocolViolation);
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&AgentError::HardTimeout {
            agent: "x".into(),
            elapsed_secs: 30,
        });
        assert_std_error(&StoreError::WorkflowNotFound("x".into()));
        assert_std_error(&TaskError::FileCapExceeded("T1".into()));
        assert_std_error(&ReviewError::PartialReview("security".into()));
        assert_std_error(&WorkflowError::ProtocolViolation("x".into()));
    }
}
