//! The Budget Ledger (C3): per-task and per-project spend tracking with
//! pre-flight denial (§4.7).
//!
//! Generalizes an earlier per-phase iteration-count budget into a
//! running-total cost ledger with `pre_debit`/`commit` semantics,
//! persisted in the same store as the Workflow Store (table
//! `budget_records`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Per-invocation cost line (§3 "Budget Record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub workflow_id: String,
    pub task_id: String,
    pub agent_id: String,
    pub cost_units: f64,
    pub duration_ms: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Tracks running spend per task and per project, denying invocations that
/// would exceed either ceiling before the agent is ever spawned.
pub struct BudgetLedger {
    project_ceiling: f64,
    task_ceiling: f64,
    project_spent: f64,
    task_spent: HashMap<String, f64>,
    task_pending: HashMap<String, f64>,
    records: Vec<BudgetRecord>,
}

impl BudgetLedger {
    pub fn new(project_ceiling: f64, task_ceiling: f64) -> Self {
        Self {
            project_ceiling,
            task_ceiling,
            project_spent: 0.0,
            task_spent: HashMap::new(),
            task_pending: HashMap::new(),
            records: Vec::new(),
        }
    }

    /// Returns `true` (allow) or `false` (deny) for the given estimate
    /// without recording a spend; a denial at Phase 3 places the task in
    /// `failed` with kind `BUDGET_EXCEEDED` (§4.7).
    pub fn pre_debit(&mut self, task_id: &str, _agent_id: &str, estimate: f64) -> bool {
        let task_committed = self.task_spent.get(task_id).copied().unwrap_or(0.0);
        let task_pending = self.task_pending.get(task_id).copied().unwrap_or(0.0);
        let would_spend_task = task_committed + task_pending + estimate;
        let would_spend_project = self.project_spent + estimate;

        if would_spend_task > self.task_ceiling || would_spend_project > self.project_ceiling {
            return false;
        }
        *self.task_pending.entry(task_id.to_string()).or_insert(0.0) += estimate;
        true
    }

    /// Records actual spend for a task/agent pair, releasing the
    /// corresponding pending reservation, and returns the `BudgetRecord`
    /// line so the caller can persist it through the Workflow Store
    /// (invariant 7: every agent invocation has exactly one matching
    /// budget record).
    pub fn commit(&mut self, workflow_id: &str, task_id: &str, agent_id: &str, actual: f64, duration: Duration) -> BudgetRecord {
        if let Some(pending) = self.task_pending.get_mut(task_id) {
            *pending = (*pending - actual).max(0.0);
        }
        *self.task_spent.entry(task_id.to_string()).or_insert(0.0) += actual;
        self.project_spent += actual;
        let record = BudgetRecord {
            workflow_id: workflow_id.to_string(),
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            cost_units: actual,
            duration_ms: duration.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        };
        self.records.push(record.clone());
        record
    }

    pub fn remaining(&self, task_id: &str) -> f64 {
        let spent = self.task_spent.get(task_id).copied().unwrap_or(0.0);
        let pending = self.task_pending.get(task_id).copied().unwrap_or(0.0);
        (self.task_ceiling - spent - pending).max(0.0)
    }

    pub fn project_remaining(&self) -> f64 {
        (self.project_ceiling - self.project_spent).max(0.0)
    }

    pub fn records(&self) -> &[BudgetRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_debit_allows_within_ceiling() {
        let mut ledger = BudgetLedger::new(100.0, 10.0);
        assert!(ledger.pre_debit("T1", "writer", 5.0));
    }

    #[test]
    fn pre_debit_denies_over_task_ceiling() {
        let mut ledger = BudgetLedger::new(100.0, 10.0);
        assert!(ledger.pre_debit("T1", "writer", 8.0));
        assert!(!ledger.pre_debit("T1", "writer", 5.0));
    }

    #[test]
    fn pre_debit_denies_over_project_ceiling_even_if_task_has_room() {
        let mut ledger = BudgetLedger::new(10.0, 100.0);
        assert!(ledger.pre_debit("T1", "writer", 6.0));
        assert!(!ledger.pre_debit("T2", "writer", 6.0));
    }

    #[test]
    fn commit_records_actual_spend_and_releases_pending() {
        let mut ledger = BudgetLedger::new(100.0, 10.0);
        ledger.pre_debit("T1", "writer", 5.0);
        ledger.commit("w1", "T1", "writer", 3.0, Duration::from_millis(250));
        assert_eq!(ledger.records().len(), 1);
        assert!(ledger.remaining("T1") > 0.0);
    }

    #[test]
    fn commit_populates_workflow_id_and_duration() {
        let mut ledger = BudgetLedger::new(100.0, 10.0);
        ledger.pre_debit("T1", "writer", 5.0);
        let record = ledger.commit("w1", "T1", "writer", 3.0, Duration::from_millis(250));
        assert_eq!(record.workflow_id, "w1");
        assert_eq!(record.duration_ms, 250);
    }

    #[test]
    fn every_commit_produces_exactly_one_budget_record() {
        let mut ledger = BudgetLedger::new(100.0, 50.0);
        ledger.pre_debit("T1", "writer", 1.0);
        ledger.commit("w1", "T1", "writer", 1.0, Duration::from_millis(10));
        ledger.pre_debit("T1", "writer", 1.0);
        ledger.commit("w1", "T1", "writer", 1.0, Duration::from_millis(10));
        assert_eq!(ledger.records().len(), 2);
    }
}
