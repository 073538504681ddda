//! The Task Lifecycle Engine (C5): DAG build/validate, complexity scoring,
//! auto-split, status transitions, and parallel scheduling.

pub mod complexity;
pub mod dag;
pub mod model;
pub mod scheduler;

pub use complexity::{ComplexityInputs, SPLIT_THRESHOLD, auto_split, complexity_score, needs_split};
pub use dag::{TaskGraph, TaskGraphBuilder, TaskIndex};
pub use model::{LastError, Priority, Task, TaskStatus};
pub use scheduler::{Scheduler, SchedulerConfig};
