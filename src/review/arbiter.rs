//! The Review Arbiter (C6): turns two reviewer artifacts into one decision.
//!
//! The teacher's `review::arbiter` module consults an LLM to mediate
//! PROCEED/FIX/ESCALATE outcomes; this arbiter is a closed-form weighted
//! calculation instead (§4.3), so none of the teacher's prompt-building or
//! subprocess dispatch survives here. What is kept, renamed into this
//! crate's vocabulary, is the result-type shape: a decision struct carrying
//! its reasoning and a source tag distinguishing a straightforward
//! rule-based outcome from one that required escalation.

use crate::review::findings::{BlockingIssue, FindingKind, FindingSeverity, ReviewerArtifact};
use serde::{Deserialize, Serialize};

/// `{kind -> (security_weight, architecture_weight)}` from §4.3.
fn weights_for(kind: FindingKind) -> (f64, f64) {
    match kind {
        FindingKind::Security => (0.9, 0.1),
        FindingKind::Architecture => (0.3, 0.7),
        FindingKind::Scalability => (0.2, 0.8),
        FindingKind::CodeQuality => (0.7, 0.6),
        FindingKind::Other => (0.5, 0.5),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approved,
    NeedsChanges,
    Rejected,
    Escalated,
}

/// Whether a decision was a deterministic application of the weight table,
/// or required flagging a disagreement to a human (§4.3 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Conservative,
    SecurityVeto,
    Escalation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixTaskSeed {
    pub id: String,
    pub severity: FindingSeverity,
    pub source_reviewer: String,
    pub files: Vec<String>,
    pub criterion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub phase: u8,
    pub security_score: f64,
    pub architecture_score: f64,
    pub combined_score: f64,
    pub blocking_issues: Vec<BlockingIssue>,
    pub decision: DecisionKind,
    pub source: DecisionSource,
    pub fix_tasks: Vec<FixTaskSeed>,
    /// Set when one of the two reviewer calls failed (§4.5): the arbiter
    /// still renders a decision but always escalates.
    pub partial: Option<String>,
}

impl ReviewDecision {
    pub fn summary(&self) -> String {
        format!(
            "phase {} -> {:?} (combined {:.1}, {} blocking issue(s), via {:?})",
            self.phase,
            self.decision,
            self.combined_score,
            self.blocking_issues.len(),
            self.source
        )
    }
}

/// The set of finding kinds in dispute between the two reviewers: every
/// kind appearing among either reviewer's blocking issues, or `other` when
/// neither raised one.
fn disputed_kinds(security: &ReviewerArtifact, architecture: &ReviewerArtifact) -> std::collections::HashSet<FindingKind> {
    use std::collections::HashSet;
    let mut kinds: HashSet<FindingKind> = security
        .blocking_issues
        .iter()
        .chain(architecture.blocking_issues.iter())
        .map(|i| i.kind)
        .collect();
    if kinds.is_empty() {
        kinds.insert(FindingKind::Other);
    }
    kinds
}

/// Combined score per §4.3 step 2-3: for each disputed kind, weight that
/// kind's two reviewer scores by the weight table, then normalize by the
/// total weight mass. Algebraically this collapses to a single weighted sum
/// over kinds without a separate per-kind intermediate, since
/// `kind_score * kind_weight_sum == security_score * sec_w + architecture_score * arch_w`.
fn combined_score(security: &ReviewerArtifact, architecture: &ReviewerArtifact) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for kind in disputed_kinds(security, architecture) {
        let (sec_w, arch_w) = weights_for(kind);
        numerator += security.score * sec_w + architecture.score * arch_w;
        denominator += sec_w + arch_w;
    }
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

/// Whether one reviewer clearly owns the domain of the dispute (§4.3 step
/// 5's "no clear domain winner" clause): among the disputed kinds, the one
/// with the most lopsided weight split is the dominant kind, and a split
/// that wide means that reviewer's verdict should be trusted rather than
/// treated as a tie needing a human. A kind whose weights are close to even
/// (e.g. `code_quality` at 0.7/0.6, `other` at 0.5/0.5) never produces a
/// winner on its own.
fn has_clear_domain_winner(security: &ReviewerArtifact, architecture: &ReviewerArtifact) -> bool {
    const DOMAIN_WINNER_MARGIN: f64 = 0.4;
    disputed_kinds(security, architecture)
        .into_iter()
        .map(|kind| {
            let (sec_w, arch_w) = weights_for(kind);
            (sec_w - arch_w).abs()
        })
        .fold(0.0_f64, f64::max)
        >= DOMAIN_WINNER_MARGIN
}

/// Runs the six-step decision procedure of §4.3 for Phase 2 (threshold 6.0)
/// or Phase 4 (threshold 7.0, applied to each reviewer independently).
pub fn arbitrate(phase: u8, security: &ReviewerArtifact, architecture: &ReviewerArtifact) -> ReviewDecision {
    let threshold = if phase == 4 { 7.0 } else { 6.0 };

    // Step 1: security veto.
    if security.has_security_veto() || architecture.has_security_veto() {
        let blocking = union_issues(security, architecture);
        return ReviewDecision {
            phase,
            security_score: security.score,
            architecture_score: architecture.score,
            combined_score: combined_score(security, architecture),
            fix_tasks: fix_task_seeds(security, architecture),
            blocking_issues: blocking,
            decision: DecisionKind::Rejected,
            source: DecisionSource::SecurityVeto,
            partial: None,
        };
    }

    let combined = combined_score(security, architecture);
    let blocking = union_issues(security, architecture);

    // Step 5: disagreement + large score delta + no clear domain winner ->
    // escalate. A lopsided weight split on the dominant disputed kind means
    // one reviewer owns that domain, so the dispute falls through to the
    // conservative rule below instead of escalating to a human.
    let disagree = security.approved != architecture.approved;
    let delta = (security.score - architecture.score).abs();
    if disagree && delta > 4.0 && !has_clear_domain_winner(security, architecture) {
        return ReviewDecision {
            phase,
            security_score: security.score,
            architecture_score: architecture.score,
            combined_score: combined,
            fix_tasks: Vec::new(),
            blocking_issues: blocking,
            decision: DecisionKind::Escalated,
            source: DecisionSource::Escalation,
            partial: None,
        };
    }

    // Conservative rule (§4.3 step 5): take the lower score; approved only
    // if it still clears the threshold and no blocking issues remain.
    let lower_score = security.score.min(architecture.score);
    let meets_threshold = if phase == 4 {
        security.score >= threshold && architecture.score >= threshold
    } else {
        combined >= threshold
    };
    let passes = meets_threshold && lower_score >= threshold && blocking.is_empty();

    let decision = if passes {
        DecisionKind::Approved
    } else {
        DecisionKind::NeedsChanges
    };

    ReviewDecision {
        phase,
        security_score: security.score,
        architecture_score: architecture.score,
        combined_score: combined,
        fix_tasks: if decision == DecisionKind::NeedsChanges {
            fix_task_seeds(security, architecture)
        } else {
            Vec::new()
        },
        blocking_issues: blocking,
        decision,
        source: DecisionSource::Conservative,
        partial: None,
    }
}

/// Built when one of the two parallel reviewer calls failed (§4.5): the
/// arbiter always escalates rather than guessing at the missing verdict.
pub fn arbitrate_partial(phase: u8, missing: &str) -> ReviewDecision {
    ReviewDecision {
        phase,
        security_score: 0.0,
        architecture_score: 0.0,
        combined_score: 0.0,
        blocking_issues: Vec::new(),
        decision: DecisionKind::Escalated,
        source: DecisionSource::Escalation,
        fix_tasks: Vec::new(),
        partial: Some(missing.to_string()),
    }
}

fn union_issues(security: &ReviewerArtifact, architecture: &ReviewerArtifact) -> Vec<BlockingIssue> {
    security
        .blocking_issues
        .iter()
        .cloned()
        .chain(architecture.blocking_issues.iter().cloned())
        .collect()
}

/// Pairs each blocking issue with the agent id of the reviewer that raised
/// it, so fix-task seeds can record `source_reviewer` (§4.3 step 6)
/// correctly rather than confusing it with the issue's file location.
fn union_issues_with_source<'a>(
    security: &'a ReviewerArtifact,
    architecture: &'a ReviewerArtifact,
) -> Vec<(&'a str, &'a BlockingIssue)> {
    security
        .blocking_issues
        .iter()
        .map(|i| (security.agent.as_str(), i))
        .chain(architecture.blocking_issues.iter().map(|i| (architecture.agent.as_str(), i)))
        .collect()
}

fn fix_task_seeds(security: &ReviewerArtifact, architecture: &ReviewerArtifact) -> Vec<FixTaskSeed> {
    union_issues_with_source(security, architecture)
        .into_iter()
        .enumerate()
        .map(|(i, (reviewer, issue))| FixTaskSeed {
            id: format!("FIX-{}", i + 1),
            severity: issue.severity,
            source_reviewer: reviewer.to_string(),
            files: issue.file.clone().into_iter().collect(),
            criterion: "issue resolved; no regression".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::findings::BlockingIssue;

    fn artifact(agent: &str, approved: bool, score: f64) -> ReviewerArtifact {
        ReviewerArtifact::new(agent, 2, approved, score)
    }

    #[test]
    fn scenario_s1_clean_success_approves() {
        let sec = artifact("security-reviewer", true, 8.0);
        let arch = artifact("architecture-reviewer", true, 7.5);
        let decision = arbitrate(2, &sec, &arch);
        assert_eq!(decision.decision, DecisionKind::Approved);
    }

    #[test]
    fn scenario_s2_security_veto_rejects_regardless_of_scores() {
        let sec = artifact("security-reviewer", false, 2.0)
            .add_blocking_issue(BlockingIssue::new(FindingSeverity::Critical, FindingKind::Security, "sqli"));
        let arch = artifact("architecture-reviewer", true, 9.0);
        let decision = arbitrate(2, &sec, &arch);
        assert_eq!(decision.decision, DecisionKind::Rejected);
        assert_eq!(decision.source, DecisionSource::SecurityVeto);
    }

    #[test]
    fn scenario_s5_escalation_on_disagreement_and_large_delta() {
        let sec = artifact("security-reviewer", false, 3.0);
        let arch = artifact("architecture-reviewer", true, 9.0);
        let decision = arbitrate(2, &sec, &arch);
        assert_eq!(decision.decision, DecisionKind::Escalated);
    }

    #[test]
    fn conservative_rule_rejects_on_lower_score_below_threshold_even_with_higher_combined() {
        // security=5.5, architecture=9.0, no blocking issues (kind=other,
        // weights 0.5/0.5): combined=7.25 clears the phase-2 threshold but
        // the lower score (5.5) does not, so the conservative rule must
        // still produce needs_changes.
        let sec = artifact("security-reviewer", true, 5.5);
        let arch = artifact("architecture-reviewer", true, 9.0);
        let decision = arbitrate(2, &sec, &arch);
        assert!(decision.combined_score >= 6.0);
        assert_eq!(decision.decision, DecisionKind::NeedsChanges);
    }

    #[test]
    fn disagreement_with_clear_domain_winner_falls_through_to_conservative_rule() {
        // A security-kind blocking issue gives the security reviewer a
        // 0.9/0.1 weight split, the widest in the table: a clear winner, so
        // the large-delta disagreement must not escalate.
        let sec = artifact("security-reviewer", true, 8.0)
            .add_blocking_issue(BlockingIssue::new(FindingSeverity::Low, FindingKind::Security, "minor"));
        let arch = artifact("architecture-reviewer", false, 2.0);
        let decision = arbitrate(2, &sec, &arch);
        assert_ne!(decision.decision, DecisionKind::Escalated);
    }

    #[test]
    fn phase_4_requires_both_reviewers_independently_above_threshold() {
        let sec = artifact("security-reviewer", true, 7.5);
        let arch = artifact("architecture-reviewer", true, 6.5);
        let decision = arbitrate(4, &sec, &arch);
        assert_eq!(decision.decision, DecisionKind::NeedsChanges);
    }

    #[test]
    fn needs_changes_emits_one_fix_task_seed_per_blocking_issue() {
        let sec = artifact("security-reviewer", true, 5.0)
            .add_blocking_issue(BlockingIssue::new(FindingSeverity::Medium, FindingKind::CodeQuality, "dup"));
        let arch = artifact("architecture-reviewer", true, 5.0);
        let decision = arbitrate(2, &sec, &arch);
        assert_eq!(decision.decision, DecisionKind::NeedsChanges);
        assert_eq!(decision.fix_tasks.len(), 1);
        assert_eq!(decision.fix_tasks[0].id, "FIX-1");
    }

    #[test]
    fn partial_review_always_escalates() {
        let decision = arbitrate_partial(2, "architecture-reviewer");
        assert_eq!(decision.decision, DecisionKind::Escalated);
        assert_eq!(decision.partial.as_deref(), Some("architecture-reviewer"));
    }
}
