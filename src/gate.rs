//! Approval gate: the pure decision logic for deliverable transitions.
//!
//! Nothing here touches the store. The engine loads current rows, asks the
//! gate what the next state is, and persists the answer — so every policy
//! rule (dual sign-off, sticky rejection, the non-empty-phase guard) lives
//! in one testable place.

use crate::errors::{WorkflowError, WorkflowResult};
use crate::models::{Actor, Deliverable, DeliverableStatus};

/// Planned effect of recording a generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationUpdate {
    pub status: DeliverableStatus,
    /// Clear both approval flags. Set for regenerations (feedback present) —
    /// never implicitly.
    pub reset_flags: bool,
}

/// Planned effect of recording an approval verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApprovalUpdate {
    pub reviewer_approved: bool,
    pub owner_approved: bool,
    pub status: DeliverableStatus,
}

/// Decide the effect of writing generated content to a deliverable.
///
/// A regeneration (one carrying feedback) resets both approval flags, and so
/// does any generation over a rejected deliverable — rejection is sticky
/// until new content clears it. Flags are never reset implicitly on other
/// paths. The deliverable always lands in `review`.
pub fn plan_generation(deliverable: &Deliverable, regeneration: bool) -> GenerationUpdate {
    GenerationUpdate {
        status: DeliverableStatus::Review,
        reset_flags: regeneration || deliverable.status == DeliverableStatus::Rejected,
    }
}

/// Decide the effect of an approval verdict from one party.
///
/// The latest call per actor wins. A rejection by either party is sticky:
/// it forces `rejected` regardless of the other party's prior approval, and
/// flipping back to approved requires a fresh generation first — approving a
/// rejected deliverable is an invalid-state error, not a silent overwrite.
pub fn plan_approval(
    deliverable: &Deliverable,
    actor: Actor,
    approved: bool,
) -> WorkflowResult<ApprovalUpdate> {
    if actor == Actor::System {
        return Err(WorkflowError::invalid_state(
            "deliverable",
            deliverable.id,
            "approvals must come from the reviewer or the owner",
        ));
    }

    if approved && deliverable.status == DeliverableStatus::Rejected {
        return Err(WorkflowError::invalid_state(
            "deliverable",
            deliverable.id,
            "a rejected deliverable must be regenerated before re-approval",
        ));
    }

    let mut reviewer_approved = deliverable.reviewer_approved;
    let mut owner_approved = deliverable.owner_approved;
    match actor {
        Actor::Reviewer => reviewer_approved = approved,
        Actor::Owner => owner_approved = approved,
        Actor::System => unreachable!("rejected above"),
    }

    let status = if !approved {
        DeliverableStatus::Rejected
    } else if reviewer_approved && owner_approved {
        DeliverableStatus::Approved
    } else {
        deliverable.status
    };

    Ok(ApprovalUpdate {
        reviewer_approved,
        owner_approved,
        status,
    })
}

/// A phase may advance iff it has at least one deliverable and every one of
/// them is approved. Zero deliverables is never ready — a misconfigured
/// template must not complete a phase silently.
pub fn phase_ready(deliverables: &[Deliverable]) -> bool {
    !deliverables.is_empty()
        && deliverables
            .iter()
            .all(|d| d.status == DeliverableStatus::Approved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliverable(
        status: DeliverableStatus,
        reviewer_approved: bool,
        owner_approved: bool,
    ) -> Deliverable {
        Deliverable {
            id: 1,
            phase_id: 1,
            title: "Market research report".into(),
            kind: "market_research".into(),
            status,
            reviewer_approved,
            owner_approved,
            generated_content: Some("...".into()),
            assignee_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn generation_moves_to_review() {
        let d = deliverable(DeliverableStatus::Pending, false, false);
        let update = plan_generation(&d, false);
        assert_eq!(update.status, DeliverableStatus::Review);
        assert!(!update.reset_flags);
    }

    #[test]
    fn regeneration_always_resets_flags() {
        for (r, o) in [(false, false), (true, false), (false, true), (true, true)] {
            let d = deliverable(DeliverableStatus::Review, r, o);
            let update = plan_generation(&d, true);
            assert!(update.reset_flags, "flags must reset for ({}, {})", r, o);
            assert_eq!(update.status, DeliverableStatus::Review);
        }
    }

    #[test]
    fn generation_over_rejection_clears_flags_even_without_feedback() {
        let d = deliverable(DeliverableStatus::Rejected, true, false);
        let update = plan_generation(&d, false);
        assert!(update.reset_flags);
    }

    #[test]
    fn single_approval_leaves_status_unchanged() {
        let d = deliverable(DeliverableStatus::Review, false, false);
        let update = plan_approval(&d, Actor::Reviewer, true).unwrap();
        assert!(update.reviewer_approved);
        assert!(!update.owner_approved);
        assert_eq!(update.status, DeliverableStatus::Review);
    }

    #[test]
    fn second_approval_completes() {
        let d = deliverable(DeliverableStatus::Review, true, false);
        let update = plan_approval(&d, Actor::Owner, true).unwrap();
        assert!(update.reviewer_approved);
        assert!(update.owner_approved);
        assert_eq!(update.status, DeliverableStatus::Approved);
    }

    #[test]
    fn approval_allowed_before_generation() {
        // Sign-off can land on a pending deliverable; the gate only blocks
        // re-approval after rejection.
        let d = deliverable(DeliverableStatus::Pending, false, false);
        let update = plan_approval(&d, Actor::Owner, true).unwrap();
        assert!(update.owner_approved);
        assert_eq!(update.status, DeliverableStatus::Pending);
    }

    #[test]
    fn rejection_overrides_prior_approval() {
        let d = deliverable(DeliverableStatus::Review, true, false);
        let update = plan_approval(&d, Actor::Owner, false).unwrap();
        assert_eq!(update.status, DeliverableStatus::Rejected);
        // The other party's flag is untouched.
        assert!(update.reviewer_approved);
        assert!(!update.owner_approved);
    }

    #[test]
    fn rejection_is_sticky_until_regeneration() {
        let d = deliverable(DeliverableStatus::Rejected, true, false);
        let err = plan_approval(&d, Actor::Owner, true).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));

        // A second rejection on an already-rejected deliverable is fine.
        let update = plan_approval(&d, Actor::Reviewer, false).unwrap();
        assert_eq!(update.status, DeliverableStatus::Rejected);
        assert!(!update.reviewer_approved);
    }

    #[test]
    fn system_actor_cannot_approve() {
        let d = deliverable(DeliverableStatus::Review, false, false);
        let err = plan_approval(&d, Actor::System, true).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
    }

    #[test]
    fn phase_ready_requires_every_deliverable_approved() {
        let approved = deliverable(DeliverableStatus::Approved, true, true);
        let in_review = deliverable(DeliverableStatus::Review, true, false);

        assert!(phase_ready(&[approved.clone()]));
        assert!(!phase_ready(&[approved.clone(), in_review]));
    }

    #[test]
    fn empty_phase_is_never_ready() {
        assert!(!phase_ready(&[]));
    }

    #[test]
    fn ready_matches_flag_conjunction() {
        // status == approved ⟺ both flags, so the gate and the flag view of
        // readiness must agree.
        let ds = vec![
            deliverable(DeliverableStatus::Approved, true, true),
            deliverable(DeliverableStatus::Approved, true, true),
        ];
        assert_eq!(
            phase_ready(&ds),
            ds.iter().all(|d| d.approval_complete())
        );
    }
}
