//! Exam status state machine
//!
//! ```text
//! pending ──approve──▶ approved ──quota──▶ assigned
//!    │                   │  │                 │
//!    └──reject──▶ cancelled  └──elapsed──▶ completed ◀──elapsed──┘
//! ```
//!
//! [`check`] is the single authority on which edges exist and who may walk them.
//! Persistence and the "status read immediately before" guard live in the service.
use crate::error::TransitionError;
use crate::exam::ExamStatus;
use crate::role::Role;

/// What causes an edge to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Approve,
    Reject,
    QuotaReached,
    DateElapsed,
}

/// Who is asking for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Actor(Role),
    System,
}

/// The trigger behind `from -> to`, if that edge exists at all.
pub fn edge(from: ExamStatus, to: ExamStatus) -> Option<Trigger> {
    use ExamStatus::*;

    match (from, to) {
        (Pending, Approved) => Some(Trigger::Approve),
        (Pending, Cancelled) | (Approved, Cancelled) => Some(Trigger::Reject),
        (Approved, Assigned) => Some(Trigger::QuotaReached),
        (Approved, Completed) | (Assigned, Completed) => Some(Trigger::DateElapsed),
        _ => None,
    }
}

impl Trigger {
    pub fn permits(&self, initiator: Initiator) -> bool {
        match (self, initiator) {
            (Trigger::Approve | Trigger::Reject, Initiator::Actor(role)) => {
                matches!(role, Role::Principal | Role::Admin)
            }
            (Trigger::QuotaReached | Trigger::DateElapsed, Initiator::System) => true,
            _ => false,
        }
    }
}

/// Validates `from -> to` for `initiator`. Edge existence is checked before
/// permission so a request outside the table is always `InvalidTransition`.
pub fn check(
    from: ExamStatus,
    to: ExamStatus,
    initiator: Initiator,
) -> Result<Trigger, TransitionError> {
    let trigger = edge(from, to).ok_or(TransitionError::InvalidTransition { from, to })?;

    if !trigger.permits(initiator) {
        return Err(TransitionError::Unauthorized);
    }

    Ok(trigger)
}

/// Every status reachable from `from` in one step.
pub fn successors(from: ExamStatus) -> Vec<ExamStatus> {
    use ExamStatus::*;

    [Pending, Approved, Assigned, Cancelled, Completed]
        .into_iter()
        .filter(|to| edge(from, *to).is_some())
        .collect()
}
