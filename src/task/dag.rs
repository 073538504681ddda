//! Task dependency DAG: build, validate, implicit-dependency insertion.
//!
//! Generalized from an earlier phase-edge-list cycle detector
//! (Kahn's-algorithm cycle detection over phases) to operate over tasks
//! instead of phases, plus implicit edges from file authorship: if task A
//! creates a file and task B modifies it, insert edge A->B even if the
//! plan omitted it.

use crate::errors::TaskError;
use crate::task::model::Task;
use std::collections::{HashMap, HashSet};

pub type TaskIndex = usize;

#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index_map: HashMap<String, TaskIndex>,
    forward_edges: Vec<Vec<TaskIndex>>,
    reverse_edges: Vec<Vec<TaskIndex>>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, index: TaskIndex) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn get_mut(&mut self, index: TaskIndex) -> Option<&mut Task> {
        self.tasks.get_mut(index)
    }

    pub fn index_of(&self, id: &str) -> Option<TaskIndex> {
        self.index_map.get(id).copied()
    }

    pub fn dependents(&self, index: TaskIndex) -> &[TaskIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn dependencies(&self, index: TaskIndex) -> &[TaskIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn root_tasks(&self) -> Vec<TaskIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Invariant 2/§4.2.4: a task may enter `in_progress` only once every
    /// dependency is `completed`.
    pub fn dependencies_satisfied(&self, index: TaskIndex, completed: &HashSet<TaskIndex>) -> bool {
        self.dependencies(index).iter().all(|d| completed.contains(d))
    }

    /// A topological order over task indices (testable property 2/§8).
    pub fn topological_order(&self) -> Vec<TaskIndex> {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(|d| d.len()).collect();
        let mut queue: Vec<TaskIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, d)| *d == 0)
            .map(|(i, _)| i)
            .collect();
        queue.sort_unstable();
        let mut order = Vec::with_capacity(self.tasks.len());
        let mut cursor = 0;
        while cursor < queue.len() {
            let node = queue[cursor];
            cursor += 1;
            order.push(node);
            let mut newly_free = Vec::new();
            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    newly_free.push(dependent);
                }
            }
            newly_free.sort_unstable();
            queue.extend(newly_free);
        }
        order
    }
}

/// Builds a `TaskGraph` from a flat task list, inserting implicit
/// file-authorship edges and rejecting cycles at build time (invariant 3).
pub struct TaskGraphBuilder {
    tasks: Vec<Task>,
}

impl TaskGraphBuilder {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn build(self) -> Result<TaskGraph, TaskError> {
        if self.tasks.is_empty() {
            return Ok(TaskGraph {
                tasks: Vec::new(),
                index_map: HashMap::new(),
                forward_edges: Vec::new(),
                reverse_edges: Vec::new(),
            });
        }

        let mut index_map = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if index_map.insert(task.id.clone(), i).is_some() {
                return Err(TaskError::Other(anyhow::anyhow!(
                    "duplicate task id: {}",
                    task.id
                )));
            }
        }

        let mut forward_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];
        let mut reverse_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];
        let mut edge_set: HashSet<(TaskIndex, TaskIndex)> = HashSet::new();

        let mut add_edge = |from: TaskIndex,
                             to: TaskIndex,
                             forward_edges: &mut Vec<Vec<TaskIndex>>,
                             reverse_edges: &mut Vec<Vec<TaskIndex>>| {
            if from == to || !edge_set.insert((from, to)) {
                return;
            }
            forward_edges[from].push(to);
            reverse_edges[to].push(from);
        };

        for (to_idx, task) in self.tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let from_idx = *index_map
                    .get(dep)
                    .ok_or_else(|| TaskError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    })?;
                add_edge(from_idx, to_idx, &mut forward_edges, &mut reverse_edges);
            }
        }

        // Implicit dependencies: task A creates a file, task B modifies it.
        let mut creators: HashMap<&std::path::Path, TaskIndex> = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            for f in &task.files_to_create {
                creators.insert(f.as_path(), i);
            }
        }
        for (to_idx, task) in self.tasks.iter().enumerate() {
            for f in &task.files_to_modify {
                if let Some(&from_idx) = creators.get(f.as_path())
                    && from_idx != to_idx
                {
                    add_edge(from_idx, to_idx, &mut forward_edges, &mut reverse_edges);
                }
            }
        }

        let graph = TaskGraph {
            tasks: self.tasks,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&graph)?;
        Ok(graph)
    }

    /// Kahn's algorithm cycle detection.
    fn validate_no_cycles(graph: &TaskGraph) -> Result<(), TaskError> {
        let mut in_degree: Vec<usize> = graph.reverse_edges.iter().map(|d| d.len()).collect();
        let mut queue: Vec<TaskIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, d)| *d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;
        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in graph.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != graph.len() {
            let cyclic: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, d)| *d > 0)
                .filter_map(|(i, _)| graph.get(i).map(|t| t.id.clone()))
                .collect();
            return Err(TaskError::CycleDetected(cyclic));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, id);
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn builds_simple_graph_with_roots() {
        let tasks = vec![task("T1", &[]), task("T2", &["T1"]), task("T3", &["T1"])];
        let graph = TaskGraphBuilder::new(tasks).build().unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.root_tasks(), vec![0]);
    }

    #[test]
    fn detects_cycles() {
        let tasks = vec![task("T1", &["T3"]), task("T2", &["T1"]), task("T3", &["T2"])];
        let err = TaskGraphBuilder::new(tasks).build().unwrap_err();
        assert!(matches!(err, TaskError::CycleDetected(_)));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let tasks = vec![task("T1", &["nonexistent"])];
        let err = TaskGraphBuilder::new(tasks).build().unwrap_err();
        assert!(matches!(err, TaskError::UnknownDependency { .. }));
    }

    #[test]
    fn inserts_implicit_edge_for_shared_file() {
        let mut a = task("T1", &[]);
        a.files_to_create = vec!["shared.py".into()];
        let mut b = task("T2", &[]);
        b.files_to_modify = vec!["shared.py".into()];
        let graph = TaskGraphBuilder::new(vec![a, b]).build().unwrap();
        let t1 = graph.index_of("T1").unwrap();
        let t2 = graph.index_of("T2").unwrap();
        assert!(graph.dependents(t1).contains(&t2));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let tasks = vec![task("T1", &[]), task("T2", &["T1"]), task("T3", &["T2"])];
        let graph = TaskGraphBuilder::new(tasks).build().unwrap();
        let order = graph.topological_order();
        let pos = |id: &str| order.iter().position(|&i| graph.get(i).unwrap().id == id).unwrap();
        assert!(pos("T1") < pos("T2"));
        assert!(pos("T2") < pos("T3"));
    }
}
