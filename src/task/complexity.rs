//! Complexity scoring and auto-split (§4.2.1, §4.2.2).

use crate::errors::TaskError;
use crate::task::model::Task;
use std::path::PathBuf;

pub const SPLIT_THRESHOLD: f64 = 5.0;

/// Inputs to the complexity formula that a plan doesn't carry verbatim and
/// must be derived from task content by the Planner before scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityInputs {
    /// [0,2] cross-layer impact (data, service, UI).
    pub dependency_breadth: f64,
    /// [0,3] derived from verb/noun patterns (CRUD = 0, algorithmic = 3).
    pub semantic_weight: f64,
    /// [0,2] penalizes ambiguous acceptance criteria.
    pub uncertainty_weight: f64,
}

/// `score = 0.5 * files_touched + dependency_breadth + semantic_weight + uncertainty_weight`
pub fn complexity_score(task: &Task, inputs: ComplexityInputs) -> f64 {
    let files_touched = (task.files_to_create.len() + task.files_to_modify.len()) as f64;
    0.5 * files_touched
        + inputs.dependency_breadth.clamp(0.0, 2.0)
        + inputs.semantic_weight.clamp(0.0, 3.0)
        + inputs.uncertainty_weight.clamp(0.0, 2.0)
}

pub fn needs_split(task: &Task) -> bool {
    task.complexity_score > SPLIT_THRESHOLD || task.exceeds_file_caps()
}

/// Apply, in order, file-group / layer / criteria splitting until every
/// resulting task scores <= `SPLIT_THRESHOLD` (§4.2.2). Returns the
/// replacement tasks in dependency order (`T<n>-a` before `T<n>-b`, ...).
pub fn auto_split(task: Task, inputs: ComplexityInputs) -> Result<Vec<Task>, TaskError> {
    if !needs_split(&task) {
        return Ok(vec![task]);
    }

    let split = file_group_split(&task);
    let mut result = Vec::with_capacity(split.len());
    for mut part in split {
        part.complexity_score = complexity_score(&part, inputs);
        if needs_split(&part) {
            return Err(TaskError::SplitDidNotConverge {
                task: part.id,
                score: part.complexity_score,
            });
        }
        result.push(part);
    }
    Ok(result)
}

/// Partition a task's files by directory, emitting `T<n>-a`, `T<n>-b`, ...
/// with a linear dependency chain between the parts. This is the first and
/// usually sufficient split strategy (file-group split); layer- and
/// criteria-based splitting are left for a future iteration if a caller's
/// files all happen to share one directory and still overflow a cap.
fn file_group_split(task: &Task) -> Vec<Task> {
    use std::collections::BTreeMap;

    let mut groups: BTreeMap<PathBuf, (Vec<PathBuf>, Vec<PathBuf>)> = BTreeMap::new();
    for f in &task.files_to_create {
        let dir = f.parent().unwrap_or_else(|| std::path::Path::new("")).to_path_buf();
        groups.entry(dir).or_default().0.push(f.clone());
    }
    for f in &task.files_to_modify {
        let dir = f.parent().unwrap_or_else(|| std::path::Path::new("")).to_path_buf();
        groups.entry(dir).or_default().1.push(f.clone());
    }

    if groups.len() < 2 {
        // Single directory: split file list roughly in half instead.
        return split_by_file_count(task);
    }

    let letters = ('a'..='z').map(|c| c.to_string());
    let mut parts = Vec::new();
    let mut previous_id: Option<String> = None;
    for (letter, (_dir, (create, modify))) in letters.zip(groups.into_iter()) {
        let id = format!("{}-{}", task.id, letter);
        let mut part = Task::new(&id, format!("{} ({})", task.title, letter));
        part.user_story = task.user_story.clone();
        part.acceptance_criteria = task.acceptance_criteria.clone();
        part.priority = task.priority;
        part.files_to_create = create;
        part.files_to_modify = modify;
        if let Some(prev) = &previous_id {
            part.dependencies.push(prev.clone());
        } else {
            part.dependencies = task.dependencies.clone();
        }
        previous_id = Some(id);
        parts.push(part);
    }
    parts
}

/// Greedily packs files into parts, each respecting the file caps (3
/// create / 5 modify). A task with `files_to_create = [a.py, b.py, c.py,
/// d.py]` (S3) packs `[a.py, b.py, c.py]` into the first part and
/// `[d.py]` into the second, rather than splitting blindly in half.
fn split_by_file_count(task: &Task) -> Vec<Task> {
    let all: Vec<(PathBuf, bool)> = task
        .files_to_create
        .iter()
        .map(|f| (f.clone(), true))
        .chain(task.files_to_modify.iter().map(|f| (f.clone(), false)))
        .collect();
    if all.len() < 2 {
        return vec![task.clone()];
    }

    let mut groups: Vec<Vec<(PathBuf, bool)>> = vec![Vec::new()];
    let (mut creates, mut modifies) = (0usize, 0usize);
    for (f, is_create) in all {
        let current = groups.last_mut().unwrap();
        let would_overflow = if is_create { creates + 1 > 3 } else { modifies + 1 > 5 };
        if would_overflow && !current.is_empty() {
            groups.push(Vec::new());
            creates = 0;
            modifies = 0;
        }
        if is_create {
            creates += 1;
        } else {
            modifies += 1;
        }
        groups.last_mut().unwrap().push((f, is_create));
    }

    let letters = ('a'..='z').map(|c| c.to_string());
    let mut parts = Vec::new();
    let mut previous_id: Option<String> = None;
    for (letter, group) in letters.zip(groups.into_iter()) {
        let id = format!("{}-{}", task.id, letter);
        let mut part = Task::new(&id, format!("{} ({})", task.title, letter));
        part.user_story = task.user_story.clone();
        part.acceptance_criteria = task.acceptance_criteria.clone();
        part.priority = task.priority;
        for (f, is_create) in group {
            if is_create {
                part.files_to_create.push(f);
            } else {
                part.files_to_modify.push(f);
            }
        }
        if let Some(prev) = &previous_id {
            part.dependencies.push(prev.clone());
        } else {
            part.dependencies = task.dependencies.clone();
        }
        previous_id = Some(id);
        parts.push(part);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_weighs_files_at_half() {
        let mut t = Task::new("T1", "x");
        t.files_to_create = vec!["a.py".into(), "b.py".into()];
        let score = complexity_score(&t, ComplexityInputs::default());
        assert_eq!(score, 1.0);
    }

    #[test]
    fn needs_split_on_score_over_threshold() {
        let mut t = Task::new("T1", "x");
        t.complexity_score = 5.5;
        assert!(needs_split(&t));
    }

    #[test]
    fn needs_split_on_file_cap_exceeded() {
        let mut t = Task::new("T1", "x");
        t.files_to_create = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(needs_split(&t));
    }

    #[test]
    fn auto_split_scenario_s3_four_create_files() {
        // All four files share one directory, so file-group split
        // collapses to file-count packing against the 3-create cap:
        // T1-a gets a.py/b.py/c.py, T1-b gets d.py and depends on T1-a.
        let mut t = Task::new("T1", "big task");
        t.files_to_create = vec!["a.py".into(), "b.py".into(), "c.py".into(), "d.py".into()];
        let parts = auto_split(t, ComplexityInputs::default()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].id, "T1-a");
        assert_eq!(parts[0].files_to_create, vec![PathBuf::from("a.py"), PathBuf::from("b.py"), PathBuf::from("c.py")]);
        assert!(parts[0].dependencies.is_empty());
        assert_eq!(parts[1].id, "T1-b");
        assert_eq!(parts[1].files_to_create, vec![PathBuf::from("d.py")]);
        assert!(parts[1].dependencies.contains(&parts[0].id));
        for p in &parts {
            assert!(p.complexity_score <= SPLIT_THRESHOLD);
        }
    }

    #[test]
    fn auto_split_is_noop_for_small_tasks() {
        let mut t = Task::new("T1", "small");
        t.files_to_create = vec!["a.py".into()];
        t.complexity_score = 1.0;
        let parts = auto_split(t.clone(), ComplexityInputs::default()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id, t.id);
    }
}
