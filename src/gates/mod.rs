//! The human-input gate consulted by `resume` when a workflow is paused on
//! a `PendingInterrupt` in interactive mode (§4.1 "Interactive vs
//! autonomous", §9 "Interrupt/resume control flow").
//!
//! Grounded on the teacher's `dialoguer::Select` + `ColorfulTheme` gate
//! pattern, narrowed from the teacher's four-way per-iteration menu
//! (approve/approve-all/reject/abort) to the two-way decision this spec's
//! `resume` contract defines (§6.1): `Proceed` or `Abort`. The gate is only
//! ever consulted from a CLI context; a caller driving `resume` with an
//! explicit `decision` (e.g. the dashboard) bypasses it entirely.

use crate::phase::{InterruptType, PendingInterrupt, ResumeDecision};
use anyhow::Result;
use dialoguer::{Select, theme::ColorfulTheme};

/// Prompts a human for the decision a paused workflow is waiting on. Every
/// pause is reconstructable from the store alone (§9), so this gate is
/// stateless: it only needs the interrupt record to phrase the question.
pub fn prompt_resume_decision(interrupt: &PendingInterrupt) -> Result<ResumeDecision> {
    let question = match interrupt.interrupt_type {
        InterruptType::NeedsChangesConfirmation => {
            format!(
                "Phase {} returned needs_changes: {}. Loop back and retry?",
                interrupt.phase.number(),
                interrupt.reason
            )
        }
        InterruptType::Escalation => {
            format!(
                "Reviewers escalated at phase {}: {}. How should this proceed?",
                interrupt.phase.number(),
                interrupt.reason
            )
        }
        InterruptType::TaskFailureConfirmation => {
            format!(
                "A task exhausted its retries: {}. Continue with remaining tasks?",
                interrupt.reason
            )
        }
    };

    let options = ["Proceed", "Abort workflow"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .items(&options)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => ResumeDecision::Proceed,
        _ => ResumeDecision::Abort,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;

    #[test]
    fn pending_interrupt_carries_enough_to_phrase_a_question() {
        let interrupt = PendingInterrupt {
            phase: Phase::Validation,
            interrupt_type: InterruptType::Escalation,
            reason: "reviewers disagree".to_string(),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(interrupt.phase.number(), 2);
    }
}
