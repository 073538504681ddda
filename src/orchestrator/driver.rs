//! The Orchestrator Driver (C8): the single-threaded `load -> advance ->
//! checkpoint -> repeat` loop that walks a workflow through the five-phase
//! lifecycle.
//!
//! One node is executed per step, its outcome classified, state persisted,
//! and the loop repeats. Generalized from an arbitrary-length promise-tag
//! phase list to the fixed Planning/Validation/Implementation/Verification/
//! Completion graph, with every transition checkpointed through the
//! Workflow Store instead of a flat JSON state file.

use crate::agent::{AgentAdapter, Capability};
use crate::budget::BudgetLedger;
use crate::errors::WorkflowError;
use crate::phase::{ExecutionMode, InterruptType, Phase, PendingInterrupt, PhaseOutcome, PhaseStatus, ResumeDecision};
use crate::plan::PlanArtifact;
use crate::review::arbiter::{arbitrate, arbitrate_partial, DecisionKind};
use crate::review::findings::{FindingKind, FindingSeverity};
use crate::task::dag::{TaskGraphBuilder, TaskIndex};
use crate::task::model::{LastError, Task, TaskStatus};
use crate::task::scheduler::{Scheduler, SchedulerConfig};
use crate::workflow::model::{PhaseOutputType, Workflow};
use crate::workflow::store::WorkflowStore;
use crate::worktree::WorktreeManager;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Every dependency the driver needs to execute one workflow. Owns none of
/// them exclusively — the store is shared with `status`/`rollback`, and a
/// caller without a git repository to operate on passes `worktrees: None`
/// (tasks still run, just without isolated checkouts).
pub struct Driver {
    store: WorkflowStore,
    agents: AgentAdapter,
    worktrees: Option<WorktreeManager>,
    scheduler: Scheduler,
}

impl Driver {
    pub fn new(store: WorkflowStore, agents: AgentAdapter, worktrees: Option<WorktreeManager>, scheduler_config: SchedulerConfig) -> Self {
        Self {
            store,
            agents,
            worktrees,
            scheduler: Scheduler::new(scheduler_config),
        }
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    /// Registers a new workflow and records the operator-supplied feature
    /// brief as the first `Plan`-typed phase output (producing agent
    /// `"operator"`), so a later rewind back to Planning can re-submit the
    /// same brief without the caller having to keep it around.
    pub fn start(&self, workflow: &Workflow, feature_brief: &str) -> Result<(), WorkflowError> {
        self.store.create(workflow)?;
        self.store.append_phase_output(
            &workflow.id,
            Phase::Planning,
            PhaseOutputType::Plan,
            &serde_json::json!({ "request": feature_brief }),
            "operator",
        )?;
        self.store.checkpoint(workflow)?;
        Ok(())
    }

    /// Runs `step` until the workflow pauses on a pending interrupt or
    /// reaches a terminal state. Idempotent across restarts: every step
    /// begins by reloading from the store, so a crash between steps loses
    /// at most the in-flight step.
    pub async fn run(&self, workflow_id: &str, budget: &mut BudgetLedger) -> Result<Workflow, WorkflowError> {
        self.run_until(workflow_id, budget, None).await
    }

    /// Like [`Driver::run`], but stops as soon as `workflow.current_phase`
    /// would advance past `end_phase`, without executing it (§6.1
    /// `start(..., end_phase)`).
    pub async fn run_until(&self, workflow_id: &str, budget: &mut BudgetLedger, end_phase: Option<Phase>) -> Result<Workflow, WorkflowError> {
        loop {
            let mut workflow = self.store.load(workflow_id)?;
            if workflow.is_terminal() || workflow.pending_interrupt.is_some() {
                return Ok(workflow);
            }
            if let Some(end) = end_phase {
                if workflow.current_phase.number() > end.number() {
                    return Ok(workflow);
                }
            }
            self.step(&mut workflow, budget).await?;
        }
    }

    /// Applies the human decision for a paused workflow, clears the
    /// interrupt, and resumes the run loop (§6.1 `resume`).
    pub async fn resume(&self, workflow_id: &str, decision: ResumeDecision, budget: &mut BudgetLedger) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.store.load(workflow_id)?;
        let interrupt = workflow.pending_interrupt.take().ok_or_else(|| {
            WorkflowError::ProtocolViolation(format!("workflow {workflow_id} has no pending interrupt"))
        })?;

        match decision {
            ResumeDecision::Abort => {
                workflow.cancelled = true;
                self.store.save(&workflow)?;
                self.store.checkpoint(&workflow)?;
                return Ok(workflow);
            }
            ResumeDecision::Proceed => {
                self.apply_proceed(&mut workflow, &interrupt)?;
                self.store.save(&workflow)?;
                self.store.checkpoint(&workflow)?;
            }
        }

        self.run(workflow_id, budget).await
    }

    /// What "proceed" means depends on why the workflow paused: a
    /// needs-changes confirmation loops back to re-run the phase that was
    /// rewound to; an escalation or task-failure confirmation lets the
    /// driver continue past whatever node raised it.
    fn apply_proceed(&self, workflow: &mut Workflow, interrupt: &PendingInterrupt) -> Result<(), WorkflowError> {
        match interrupt.interrupt_type {
            InterruptType::NeedsChangesConfirmation | InterruptType::Escalation => {
                workflow.current_phase = interrupt.phase;
                workflow.set_status(interrupt.phase, PhaseStatus::Pending);
            }
            InterruptType::TaskFailureConfirmation => {
                workflow.current_phase = Phase::Implementation;
                workflow.set_status(Phase::Implementation, PhaseStatus::Pending);
            }
        }
        Ok(())
    }

    /// Executes the action for `workflow.current_phase`, classifies the
    /// outcome, applies the §4.1 conditional edge, persists, and
    /// checkpoints. One call advances the workflow by at most one node.
    async fn step(&self, workflow: &mut Workflow, budget: &mut BudgetLedger) -> Result<(), WorkflowError> {
        workflow.iteration_count += 1;
        if workflow.iteration_count > workflow.iteration_cap {
            return Err(WorkflowError::IterationCapExceeded {
                workflow_id: workflow.id.clone(),
                cap: workflow.iteration_cap,
            });
        }

        let phase = workflow.current_phase;
        workflow.set_status(phase, PhaseStatus::InProgress);

        let outcome = match phase {
            Phase::Planning => self.run_planning(workflow, budget).await?,
            Phase::Validation => self.run_review(workflow, budget, Phase::Validation).await?,
            Phase::Implementation => self.run_implementation(workflow, budget).await?,
            Phase::Verification => self.run_review(workflow, budget, Phase::Verification).await?,
            Phase::Completion => self.run_completion(workflow)?,
        };

        self.apply_outcome(workflow, phase, outcome)?;
        self.store.save(workflow)?;
        self.store.checkpoint(workflow)?;
        Ok(())
    }

    // ── Phase 1: Planning ──────────────────────────────────────────────

    async fn run_planning(&self, workflow: &Workflow, budget: &mut BudgetLedger) -> Result<PhaseOutcome, WorkflowError> {
        let brief = self.latest_feature_brief(&workflow.id)?;
        let max_retries = Phase::Planning.node().max_retries;

        let mut last_error = String::new();
        for attempt in 0..=max_retries {
            let prompt = planning_prompt(&brief, attempt, &last_error);
            let invocation = self
                .agents
                .invoke(Capability::ProducePlan, &workflow.id, "planning", &prompt, budget, &self.store)
                .await?;

            match AgentAdapter::parse_structured::<PlanArtifact>("writer", &invocation.raw_output) {
                Ok(plan) => match plan.validate() {
                    Ok(()) => {
                        let payload = serde_json::to_value(&plan)
                            .map_err(|e| WorkflowError::Other(anyhow::anyhow!(e)))?;
                        self.store
                            .append_phase_output(&workflow.id, Phase::Planning, PhaseOutputType::Plan, &payload, "writer")?;
                        for task in plan.into_tasks()? {
                            self.store.upsert_task(&workflow.id, &task)?;
                        }
                        return Ok(PhaseOutcome::ParseOk);
                    }
                    Err(validation_err) => last_error = validation_err.to_string(),
                },
                Err(agent_err) => last_error = agent_err.to_string(),
            }
        }
        Ok(PhaseOutcome::ParseFail(last_error))
    }

    fn latest_feature_brief(&self, workflow_id: &str) -> Result<String, WorkflowError> {
        let outputs = self.store.query_by_type(workflow_id, PhaseOutputType::Plan)?;
        let request = outputs
            .iter()
            .find(|o| o.producing_agent == "operator")
            .and_then(|o| o.payload.get("request"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(request.to_string())
    }

    // ── Phase 2 / 4: Validation & Verification ─────────────────────────

    async fn run_review(&self, workflow: &Workflow, budget: &mut BudgetLedger, phase: Phase) -> Result<PhaseOutcome, WorkflowError> {
        let artifact_summary = self.artifact_summary_for_review(workflow, phase)?;
        let security_prompt = review_prompt("security-reviewer", phase, &artifact_summary);
        let architecture_prompt = review_prompt("architecture-reviewer", phase, &artifact_summary);

        let (security, architecture) = self
            .agents
            .dispatch_reviewers(
                &workflow.id,
                &format!("phase-{}", phase.number()),
                &security_prompt,
                &architecture_prompt,
                budget,
                &self.store,
            )
            .await?;

        let decision = match (security, architecture) {
            (Some(sec), Some(arch)) => arbitrate(phase.number(), &sec, &arch),
            (None, Some(_)) => arbitrate_partial(phase.number(), "security-reviewer"),
            (Some(_), None) => arbitrate_partial(phase.number(), "architecture-reviewer"),
            (None, None) => arbitrate_partial(phase.number(), "security-reviewer, architecture-reviewer"),
        };

        let output_type = match phase {
            Phase::Validation => PhaseOutputType::ValidationConsolidated,
            _ => PhaseOutputType::VerificationConsolidated,
        };
        let payload = serde_json::to_value(&decision).map_err(|e| WorkflowError::Other(anyhow::anyhow!(e)))?;
        self.store.append_phase_output(&workflow.id, phase, output_type, &payload, "arbiter")?;
        self.store.record_review_decision(&workflow.id, &decision)?;

        Ok(match decision.decision {
            DecisionKind::Approved => PhaseOutcome::Approved,
            DecisionKind::NeedsChanges => PhaseOutcome::NeedsChanges {
                fix_tasks: decision.fix_tasks.iter().map(|f| f.id.clone()).collect(),
            },
            DecisionKind::Rejected => PhaseOutcome::Rejected,
            DecisionKind::Escalated => PhaseOutcome::Escalated {
                reason: decision.summary(),
            },
        })
    }

    fn artifact_summary_for_review(&self, workflow: &Workflow, phase: Phase) -> Result<String, WorkflowError> {
        match phase {
            Phase::Validation => {
                let plan = self.store.latest_by_type(&workflow.id, PhaseOutputType::Plan)?;
                Ok(plan.map(|p| p.payload.to_string()).unwrap_or_default())
            }
            _ => {
                let tasks = self.store.list_tasks(&workflow.id)?;
                Ok(serde_json::to_string(&tasks).unwrap_or_default())
            }
        }
    }

    // ── Phase 3: Implementation ─────────────────────────────────────────

    async fn run_implementation(&self, workflow: &Workflow, budget: &mut BudgetLedger) -> Result<PhaseOutcome, WorkflowError> {
        let tasks = self.store.list_tasks(&workflow.id)?;
        if tasks.is_empty() {
            return Ok(PhaseOutcome::AllTasksCompleted);
        }
        let graph = TaskGraphBuilder::new(tasks).build()?;
        let base_sha = self.worktrees.as_ref().and_then(|w| w.head_sha().ok());

        let mut statuses: HashMap<TaskIndex, TaskStatus> = (0..graph.len())
            .map(|i| (i, graph.get(i).map(|t| t.status).unwrap_or(TaskStatus::Pending)))
            .collect();
        let mut running_files: HashSet<PathBuf> = HashSet::new();

        loop {
            let all_terminal = statuses.values().all(|s| s.is_terminal());
            if all_terminal {
                break;
            }
            let ready = self.scheduler.next_ready(&graph, &statuses, &running_files, 0);
            if ready.is_empty() {
                // Nothing schedulable but not all terminal: either every
                // remaining task is blocked on a failed dependency, or we
                // are mid-retry waiting for the next pass. Either way there
                // is no forward progress to make in this step.
                break;
            }

            for idx in ready {
                let Some(task) = graph.get(idx) else { continue };
                for f in task.all_files() {
                    running_files.insert(f.clone());
                }
                let outcome = self.run_one_task(workflow, task, base_sha.as_deref(), budget).await;
                let mut updated = task.clone();
                match outcome {
                    Ok(()) => {
                        updated.status = TaskStatus::Completed;
                        statuses.insert(idx, TaskStatus::Completed);
                    }
                    Err(message) => {
                        updated.attempt_count += 1;
                        updated.last_error = Some(LastError {
                            message: message.clone(),
                            kind: "IMPLEMENTATION_FAILED".to_string(),
                            at: chrono::Utc::now(),
                        });
                        if updated.attempt_count >= Phase::Implementation.node().max_retries {
                            updated.status = TaskStatus::Failed;
                            statuses.insert(idx, TaskStatus::Failed);
                        } else {
                            updated.status = TaskStatus::Retry;
                            statuses.insert(idx, TaskStatus::Retry);
                        }
                    }
                }
                self.store.upsert_task(&workflow.id, &updated)?;
            }
        }

        if let Some((idx, _)) = statuses.iter().find(|(_, s)| **s == TaskStatus::Failed) {
            let task_id = graph.get(*idx).map(|t| t.id.clone()).unwrap_or_default();
            return Ok(PhaseOutcome::TaskFailed { task_id });
        }
        if statuses.values().all(|s| *s == TaskStatus::Completed) {
            return Ok(PhaseOutcome::AllTasksCompleted);
        }
        // Still tasks pending/blocked/retry with no ready candidates this
        // pass; report the first such task as failed-to-progress so the
        // driver doesn't spin without making headway.
        let stuck = statuses
            .iter()
            .find(|(_, s)| !s.is_terminal())
            .and_then(|(idx, _)| graph.get(*idx))
            .map(|t| t.id.clone())
            .unwrap_or_default();
        Ok(PhaseOutcome::TaskFailed { task_id: stuck })
    }

    async fn run_one_task(
        &self,
        workflow: &Workflow,
        task: &Task,
        base_sha: Option<&str>,
        budget: &mut BudgetLedger,
    ) -> Result<(), String> {
        let prompt = implementation_prompt(task);

        if let (Some(manager), Some(base)) = (&self.worktrees, base_sha) {
            let worktree = manager.acquire(&task.id, base).map_err(|e| e.to_string())?;
            let invocation = self
                .agents
                .invoke(Capability::ImplementTask, &workflow.id, &task.id, &prompt, budget, &self.store)
                .await
                .map_err(|e| e.to_string())?;
            manager.snapshot(&worktree, &format!("implement {}", task.id)).map_err(|e| e.to_string())?;
            let changes = manager.compute_changes(&worktree, base).map_err(|e| e.to_string())?;
            tracing::info!(task_id = %task.id, files_touched = changes.total_files(), "task worktree changes computed");
            manager
                .land_and_release(worktree, &workflow.feature_branch)
                .map_err(|e| e.to_string())?;
            let payload = serde_json::json!({
                "task_id": task.id,
                "raw_output": invocation.raw_output,
                "files_touched": changes.total_files(),
            });
            self.store
                .append_phase_output(&workflow.id, Phase::Implementation, PhaseOutputType::ImplementationResult, &payload, "writer")
                .map_err(|e| e.to_string())?;
            Ok(())
        } else {
            let invocation = self
                .agents
                .invoke(Capability::ImplementTask, &workflow.id, &task.id, &prompt, budget, &self.store)
                .await
                .map_err(|e| e.to_string())?;
            let payload = serde_json::json!({ "task_id": task.id, "raw_output": invocation.raw_output });
            self.store
                .append_phase_output(&workflow.id, Phase::Implementation, PhaseOutputType::ImplementationResult, &payload, "writer")
                .map_err(|e| e.to_string())?;
            Ok(())
        }
    }

    // ── Phase 5: Completion ──────────────────────────────────────────────

    fn run_completion(&self, workflow: &Workflow) -> Result<PhaseOutcome, WorkflowError> {
        tracing::info!(workflow_id = %workflow.id, "workflow reached completion");
        Ok(PhaseOutcome::Approved)
    }

    // ── Conditional edges (§4.1) ─────────────────────────────────────────

    fn apply_outcome(&self, workflow: &mut Workflow, phase: Phase, outcome: PhaseOutcome) -> Result<(), WorkflowError> {
        match outcome {
            PhaseOutcome::ParseOk | PhaseOutcome::Approved => {
                workflow.set_status(phase, PhaseStatus::Completed);
                if let Some(mut next) = phase.next() {
                    // §6.1 `start(..., skip_validation)`: Phase 2 is marked
                    // completed without ever dispatching reviewers.
                    if next == Phase::Validation && workflow.skip_validation {
                        workflow.set_status(Phase::Validation, PhaseStatus::Completed);
                        next = Phase::Implementation;
                    }
                    workflow.current_phase = next;
                }
            }
            PhaseOutcome::ParseFail(reason) => {
                workflow.set_status(phase, PhaseStatus::Failed);
                self.pause_or_fail(workflow, phase, InterruptType::NeedsChangesConfirmation, reason)?;
            }
            PhaseOutcome::NeedsChanges { fix_tasks } => {
                workflow.set_status(phase, PhaseStatus::NeedsFixes);
                // §4.1: Phase 2 needs_changes always rewinds to Planning.
                // Phase 4 needs_changes rewinds to Implementation unless a
                // critical architecture finding demands a replan (§9).
                let rewind_to = match phase {
                    Phase::Validation => Phase::Planning,
                    _ => self.rewind_target(&workflow.id, phase)?,
                };
                let reason = format!("{} fix task(s) pending: {}", fix_tasks.len(), fix_tasks.join(", "));
                match workflow.execution_mode {
                    ExecutionMode::Autonomous => {
                        workflow.current_phase = rewind_to;
                        workflow.set_status(rewind_to, PhaseStatus::Pending);
                    }
                    ExecutionMode::Interactive => {
                        workflow.pending_interrupt = Some(PendingInterrupt {
                            phase: rewind_to,
                            interrupt_type: InterruptType::NeedsChangesConfirmation,
                            reason,
                            created_at: chrono::Utc::now(),
                        });
                    }
                }
            }
            PhaseOutcome::Rejected => {
                workflow.set_status(phase, PhaseStatus::Failed);
                self.pause_or_fail(workflow, phase, InterruptType::Escalation, "security veto: rejected".to_string())?;
            }
            PhaseOutcome::Escalated { reason } => {
                workflow.set_status(phase, PhaseStatus::NeedsFixes);
                workflow.pending_interrupt = Some(PendingInterrupt {
                    phase,
                    interrupt_type: InterruptType::Escalation,
                    reason,
                    created_at: chrono::Utc::now(),
                });
            }
            PhaseOutcome::AllTasksCompleted => {
                workflow.set_status(phase, PhaseStatus::Completed);
                if let Some(next) = phase.next() {
                    workflow.current_phase = next;
                }
            }
            PhaseOutcome::TaskFailed { task_id } => {
                workflow.set_status(phase, PhaseStatus::Failed);
                self.pause_or_fail(
                    workflow,
                    phase,
                    InterruptType::TaskFailureConfirmation,
                    format!("task {task_id} exhausted its retries"),
                )?;
            }
        }
        Ok(())
    }

    /// Escalations always pause for a human; everything else pauses only in
    /// interactive mode and fails the workflow outright in autonomous mode
    /// (§4.1 "autonomous" column, §9).
    fn pause_or_fail(&self, workflow: &mut Workflow, phase: Phase, interrupt_type: InterruptType, reason: String) -> Result<(), WorkflowError> {
        match workflow.execution_mode {
            ExecutionMode::Interactive => {
                workflow.pending_interrupt = Some(PendingInterrupt {
                    phase,
                    interrupt_type,
                    reason,
                    created_at: chrono::Utc::now(),
                });
                Ok(())
            }
            ExecutionMode::Autonomous => Err(WorkflowError::ProtocolViolation(format!(
                "phase {} failed in autonomous mode: {reason}",
                phase.number()
            ))),
        }
    }

    /// An architecture-kind critical blocking issue rewinds all the way to
    /// Planning (the plan itself is unsound); anything else rewinds to
    /// Implementation, where a `FIX-<n>` task is expected to land.
    fn rewind_target(&self, workflow_id: &str, phase: Phase) -> Result<Phase, WorkflowError> {
        let output_type = match phase {
            Phase::Validation => PhaseOutputType::ValidationConsolidated,
            _ => PhaseOutputType::VerificationConsolidated,
        };
        let latest = self.store.latest_by_type(workflow_id, output_type)?;
        let has_critical_architecture_issue = latest
            .and_then(|o| o.payload.get("blocking_issues").cloned())
            .and_then(|v| serde_json::from_value::<Vec<crate::review::findings::BlockingIssue>>(v).ok())
            .map(|issues| {
                issues
                    .iter()
                    .any(|issue| issue.kind == FindingKind::Architecture && issue.severity == FindingSeverity::Critical)
            })
            .unwrap_or(false);
        Ok(if has_critical_architecture_issue {
            Phase::Planning
        } else {
            Phase::Implementation
        })
    }
}

fn planning_prompt(brief: &str, attempt: u32, last_error: &str) -> String {
    if attempt == 0 {
        format!(
            "Produce a plan artifact (feature, tasks, test_strategy, risks) for the following feature request:\n\n{brief}"
        )
    } else {
        format!(
            "The previous plan was rejected: {last_error}\n\nProduce a corrected plan artifact for:\n\n{brief}"
        )
    }
}

fn review_prompt(reviewer: &str, phase: Phase, artifact_summary: &str) -> String {
    format!(
        "You are the {reviewer}. Review the following artifact for phase {} ({phase}) and respond with a ReviewerArtifact JSON object:\n\n{artifact_summary}",
        phase.number()
    )
}

fn implementation_prompt(task: &Task) -> String {
    format!(
        "Implement task {} under a TDD contract: {}\nAcceptance criteria: {:?}\nFiles to create: {:?}\nFiles to modify: {:?}",
        task.id, task.title, task.acceptance_criteria, task.files_to_create, task.files_to_modify
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;

    fn new_driver() -> Driver {
        let store = WorkflowStore::open_in_memory().unwrap();
        let agents = AgentAdapter::new(AgentConfig::default());
        Driver::new(store, agents, None, SchedulerConfig::default())
    }

    #[test]
    fn start_persists_workflow_and_brief() {
        let driver = new_driver();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        driver.start(&workflow, "add widgets").unwrap();
        let brief = driver.latest_feature_brief("w1").unwrap();
        assert_eq!(brief, "add widgets");
    }

    #[test]
    fn rewind_target_defaults_to_implementation_without_prior_output() {
        let driver = new_driver();
        let workflow = Workflow::new("w1", "proj1", ExecutionMode::Autonomous);
        driver.store().create(&workflow).unwrap();
        let target = driver.rewind_target("w1", Phase::Validation).unwrap();
        assert_eq!(target, Phase::Implementation);
    }
}
