//! Reviewer artifact types (§4.3, §6.3).
//!
//! Generalized from the teacher's four-level severity (error/warning/info/
//! note) and single-specialist-verdict model to the two fixed reviewer
//! identities and four-level severity this crate arbitrates over.
//!
//! ## Example
//!
//! ```
//! use conductor::review::findings::{BlockingIssue, FindingSeverity, FindingKind, ReviewerArtifact};
//!
//! let artifact = ReviewerArtifact::new("security-reviewer", 2, true, 8.0)
//!     .with_assessment("looks solid")
//!     .add_blocking_issue(BlockingIssue::new(FindingSeverity::Medium, FindingKind::CodeQuality, "minor duplication"));
//!
//! assert_eq!(artifact.blocking_issues.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

/// Severity of a blocking issue raised by a reviewer (§3 Review Decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// The domain a finding belongs to, used by the arbiter's weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Security,
    Architecture,
    Scalability,
    CodeQuality,
    Other,
}

/// One blocking issue inside a reviewer artifact (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingIssue {
    pub severity: FindingSeverity,
    pub kind: FindingKind,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub description: String,
    pub fix: Option<String>,
}

impl BlockingIssue {
    pub fn new(severity: FindingSeverity, kind: FindingKind, description: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            file: None,
            line: None,
            description: description.into(),
            fix: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

/// The raw artifact one reviewer agent produces (§4.5, §6.3):
/// `{agent, phase, approved, score, assessment, blocking_issues, recommendations}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerArtifact {
    pub agent: String,
    pub phase: u8,
    pub approved: bool,
    /// 1..10
    pub score: f64,
    pub assessment: String,
    pub blocking_issues: Vec<BlockingIssue>,
    pub recommendations: Vec<String>,
}

impl ReviewerArtifact {
    pub fn new(agent: impl Into<String>, phase: u8, approved: bool, score: f64) -> Self {
        Self {
            agent: agent.into(),
            phase,
            approved,
            score,
            assessment: String::new(),
            blocking_issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_assessment(mut self, assessment: impl Into<String>) -> Self {
        self.assessment = assessment.into();
        self
    }

    pub fn add_blocking_issue(mut self, issue: BlockingIssue) -> Self {
        self.blocking_issues.push(issue);
        self
    }

    pub fn has_security_veto(&self) -> bool {
        self.blocking_issues.iter().any(|i| {
            i.kind == FindingKind::Security
                && matches!(i.severity, FindingSeverity::Critical | FindingSeverity::High)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_accumulate_state() {
        let artifact = ReviewerArtifact::new("security-reviewer", 2, true, 8.0)
            .with_assessment("fine")
            .add_blocking_issue(BlockingIssue::new(
                FindingSeverity::Low,
                FindingKind::Other,
                "nit",
            ));
        assert_eq!(artifact.assessment, "fine");
        assert_eq!(artifact.blocking_issues.len(), 1);
    }

    #[test]
    fn security_veto_detects_critical_and_high_security_findings() {
        let artifact = ReviewerArtifact::new("security-reviewer", 2, false, 2.0).add_blocking_issue(
            BlockingIssue::new(FindingSeverity::Critical, FindingKind::Security, "sqli"),
        );
        assert!(artifact.has_security_veto());
    }

    #[test]
    fn security_veto_ignores_non_security_critical_findings() {
        let artifact = ReviewerArtifact::new("architecture-reviewer", 2, false, 2.0).add_blocking_issue(
            BlockingIssue::new(FindingSeverity::Critical, FindingKind::Architecture, "coupling"),
        );
        assert!(!artifact.has_security_veto());
    }
}
