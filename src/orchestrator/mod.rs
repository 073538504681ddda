//! The Orchestrator Driver (C8): the durable control loop that walks a
//! workflow through Planning -> Validation -> Implementation ->
//! Verification -> Completion, one node at a time, checkpointing after
//! every transition so a crash loses at most the in-flight step.
//!
//! Replaces an earlier arbitrary-length promise-tag iteration loop with
//! the fixed five-node graph this crate drives; see [`driver`].

pub mod driver;

pub use driver::Driver;
