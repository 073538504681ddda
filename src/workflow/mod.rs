//! The Workflow Store (C2) and workflow data model (§3, §4.4).
//!
//! - [`model`]: `Workflow`, `PhaseOutput`, `Checkpoint` data types
//! - [`store`]: durable SQLite-backed persistence over those types

pub mod model;
pub mod store;

pub use model::{Checkpoint, PhaseOutput, PhaseOutputType, Workflow};
pub use store::WorkflowStore;
