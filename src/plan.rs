//! The plan artifact schema (§6.2) produced by the writer agent's
//! `produce_plan` capability at Phase 1, and its conversion into the
//! internal `Task` model consumed by the Task Lifecycle Engine.
//!
//! Grounded on the teacher's plan/spec parsing conventions (strict
//! `serde` deserialization, field-length validation performed in code
//! rather than left to the schema) generalized from the teacher's
//! free-form phase list to this spec's fixed plan-artifact shape.

use crate::errors::TaskError;
use crate::task::complexity::{ComplexityInputs, auto_split};
use crate::task::model::{Priority, Task};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    pub summary: String,
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedComplexity {
    Low,
    Medium,
    High,
}

impl EstimatedComplexity {
    /// Maps the plan's coarse three-level estimate onto the numeric
    /// complexity formula's scale (§4.2.1) as a starting point; the exact
    /// score is still recomputed from file counts once the task is built.
    fn base_weight(self) -> f64 {
        match self {
            EstimatedComplexity::Low => 0.0,
            EstimatedComplexity::Medium => 1.5,
            EstimatedComplexity::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub user_story: String,
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub files_to_create: Vec<PathBuf>,
    #[serde(default)]
    pub files_to_modify: Vec<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub priority: Priority,
    pub estimated_complexity: EstimatedComplexity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStrategy {
    pub coverage_target: f64,
    #[serde(default)]
    pub approach: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub severity: RiskSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanArtifact {
    pub feature: FeatureInfo,
    pub tasks: Vec<PlanTask>,
    pub test_strategy: TestStrategy,
    #[serde(default)]
    pub risks: Vec<Risk>,
}

/// A plan that failed the §6.2 schema constraints. Planning re-runs with
/// this attached to its prompt (§6.2 "Invalid plans are rejected...").
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanValidationError {
    #[error("feature.name exceeds 100 chars")]
    FeatureNameTooLong,
    #[error("feature.summary exceeds 500 chars")]
    FeatureSummaryTooLong,
    #[error("plan has no tasks")]
    NoTasks,
    #[error("task {0} id does not match ^T\\d+(-[a-z])?$")]
    InvalidTaskId(String),
    #[error("task {0} title exceeds 80 chars")]
    TitleTooLong(String),
    #[error("task {0} has more than 5 acceptance criteria")]
    TooManyAcceptanceCriteria(String),
    #[error("task {0} has more than 3 files_to_create")]
    TooManyFilesToCreate(String),
    #[error("task {0} has more than 5 files_to_modify")]
    TooManyFilesToModify(String),
    #[error("test_strategy.coverage_target {0} is outside [0, 100]")]
    CoverageTargetOutOfRange(f64),
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),
}

impl PlanArtifact {
    /// Validates the plan against every constraint in §6.2. Called at
    /// Phase 1 completion before the plan is accepted.
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        if self.feature.name.chars().count() > 100 {
            return Err(PlanValidationError::FeatureNameTooLong);
        }
        if self.feature.summary.chars().count() > 500 {
            return Err(PlanValidationError::FeatureSummaryTooLong);
        }
        if self.tasks.is_empty() {
            return Err(PlanValidationError::NoTasks);
        }
        if !(0.0..=100.0).contains(&self.test_strategy.coverage_target) {
            return Err(PlanValidationError::CoverageTargetOutOfRange(
                self.test_strategy.coverage_target,
            ));
        }

        let task_id_re = task_id_pattern();
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.clone()) {
                return Err(PlanValidationError::DuplicateTaskId(task.id.clone()));
            }
            if !task_id_re.is_match(&task.id) {
                return Err(PlanValidationError::InvalidTaskId(task.id.clone()));
            }
            if task.title.chars().count() > 80 {
                return Err(PlanValidationError::TitleTooLong(task.id.clone()));
            }
            if task.acceptance_criteria.len() > 5 {
                return Err(PlanValidationError::TooManyAcceptanceCriteria(task.id.clone()));
            }
            if task.files_to_create.len() > 3 {
                return Err(PlanValidationError::TooManyFilesToCreate(task.id.clone()));
            }
            if task.files_to_modify.len() > 5 {
                return Err(PlanValidationError::TooManyFilesToModify(task.id.clone()));
            }
        }
        Ok(())
    }

    /// Converts every `PlanTask` into an internal `Task`, scoring
    /// complexity (§4.2.1) and auto-splitting any task over threshold or
    /// over a file cap (§4.2.2, invariant 5).
    pub fn into_tasks(self) -> Result<Vec<Task>, TaskError> {
        let mut result = Vec::new();
        for plan_task in self.tasks {
            let mut task = Task::new(plan_task.id, plan_task.title);
            task.user_story = plan_task.user_story;
            task.acceptance_criteria = plan_task.acceptance_criteria;
            task.files_to_create = plan_task.files_to_create;
            task.files_to_modify = plan_task.files_to_modify;
            task.dependencies = plan_task.dependencies;
            task.priority = plan_task.priority;

            let inputs = ComplexityInputs {
                dependency_breadth: 0.0,
                semantic_weight: plan_task.estimated_complexity.base_weight(),
                uncertainty_weight: 0.0,
            };
            let score = crate::task::complexity::complexity_score(&task, inputs);
            task.complexity_score = score;
            for mut split in auto_split(task, inputs)? {
                split.complexity_score = crate::task::complexity::complexity_score(&split, inputs);
                result.push(split);
            }
        }
        Ok(result)
    }
}

/// `^T\d+(-[a-z])?$` (§6.2), compiled once per validation call.
fn task_id_pattern() -> regex::Regex {
    regex::Regex::new(r"^T\d+(-[a-z])?$").expect("task id pattern is a fixed, valid regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_plan() -> PlanArtifact {
        PlanArtifact {
            feature: FeatureInfo {
                name: "Widgets".to_string(),
                summary: "Add widget support".to_string(),
                acceptance_criteria: vec!["widgets render".to_string()],
            },
            tasks: vec![PlanTask {
                id: "T1".to_string(),
                title: "Build widget model".to_string(),
                user_story: String::new(),
                acceptance_criteria: vec!["model exists".to_string()],
                files_to_create: vec!["widget.py".into()],
                files_to_modify: vec![],
                dependencies: vec![],
                priority: Priority::Medium,
                estimated_complexity: EstimatedComplexity::Low,
            }],
            test_strategy: TestStrategy {
                coverage_target: 80.0,
                approach: "unit tests".to_string(),
            },
            risks: vec![],
        }
    }

    #[test]
    fn accepts_well_formed_plan() {
        assert!(valid_plan().validate().is_ok());
    }

    #[test]
    fn rejects_task_id_not_matching_pattern() {
        let mut plan = valid_plan();
        plan.tasks[0].id = "task-1".to_string();
        assert!(matches!(plan.validate(), Err(PlanValidationError::InvalidTaskId(_))));
    }

    #[test]
    fn accepts_split_suffix_task_id() {
        let mut plan = valid_plan();
        plan.tasks[0].id = "T1-a".to_string();
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn rejects_coverage_target_out_of_range() {
        let mut plan = valid_plan();
        plan.test_strategy.coverage_target = 150.0;
        assert!(matches!(
            plan.validate(),
            Err(PlanValidationError::CoverageTargetOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_empty_task_list() {
        let mut plan = valid_plan();
        plan.tasks.clear();
        assert!(matches!(plan.validate(), Err(PlanValidationError::NoTasks)));
    }

    #[test]
    fn rejects_duplicate_task_ids() {
        let mut plan = valid_plan();
        let dup = plan.tasks[0].clone();
        plan.tasks.push(dup);
        assert!(matches!(plan.validate(), Err(PlanValidationError::DuplicateTaskId(_))));
    }

    #[test]
    fn into_tasks_splits_tasks_over_the_file_cap() {
        let mut plan = valid_plan();
        plan.tasks[0].files_to_create =
            vec!["a.py".into(), "b.py".into(), "c.py".into(), "d.py".into()];
        let tasks = plan.into_tasks().unwrap();
        assert!(tasks.len() >= 2);
        for t in &tasks {
            assert!(t.complexity_score <= crate::task::complexity::SPLIT_THRESHOLD);
        }
    }
}
