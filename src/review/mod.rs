//! The Review Arbitration Engine (C6): two reviewer artifacts in, one
//! consolidated decision out, per the adversarial four-eyes protocol.
//!
//! ## Components
//!
//! - [`findings`]: reviewer artifact and blocking-issue types
//! - [`arbiter`]: the weighted decision procedure of §4.3
//!
//! ## Example
//!
//! ```
//! use conductor::review::{arbiter, findings::ReviewerArtifact};
//!
//! let security = ReviewerArtifact::new("security-reviewer", 2, true, 8.0);
//! let architecture = ReviewerArtifact::new("architecture-reviewer", 2, true, 7.5);
//! let decision = arbiter::arbitrate(2, &security, &architecture);
//! assert_eq!(decision.decision, conductor::review::arbiter::DecisionKind::Approved);
//! ```

pub mod arbiter;
pub mod findings;

pub use arbiter::{DecisionKind, DecisionSource, FixTaskSeed, ReviewDecision};
pub use findings::{BlockingIssue, FindingKind, FindingSeverity, ReviewerArtifact};
