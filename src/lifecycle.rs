//! Transaction lifecycle: the closed set of events and the transition table.
//!
//! ```text
//! active ──MatchAccepted──▶ matched ──SubmittedForReview──▶ pending_approval
//!   │                          │                               │        │
//! OwnerWithdrew             Released                ReviewerApproved  ReviewerRejected
//!   ▼                          ▼                               ▼        ▼
//! cancelled                  active                        approved  rejected
//!                                       pending_approval ──Released──▶ active
//! ```
//!
//! `Released` is the only backward move: it dissolves a pairing (withdrawal or a
//! rejected review that relists both sides). The store consults [`is_legal`] on
//! every write, so no caller can apply a transition outside this table.

use crate::error::EngineError;
use crate::types::TransactionStatus;

/// What happened to a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    MatchAccepted,
    SubmittedForReview,
    ReviewerApproved,
    ReviewerRejected,
    Released,
    OwnerWithdrew,
}

const TABLE: &[(TransactionStatus, LifecycleEvent, TransactionStatus)] = &[
    (TransactionStatus::Active, LifecycleEvent::MatchAccepted, TransactionStatus::Matched),
    (TransactionStatus::Matched, LifecycleEvent::SubmittedForReview, TransactionStatus::PendingApproval),
    (TransactionStatus::PendingApproval, LifecycleEvent::ReviewerApproved, TransactionStatus::Approved),
    (TransactionStatus::PendingApproval, LifecycleEvent::ReviewerRejected, TransactionStatus::Rejected),
    (TransactionStatus::Matched, LifecycleEvent::Released, TransactionStatus::Active),
    (TransactionStatus::PendingApproval, LifecycleEvent::Released, TransactionStatus::Active),
    (TransactionStatus::Active, LifecycleEvent::OwnerWithdrew, TransactionStatus::Cancelled),
];

/// Status reached from `from` on `event`, or `None` if the table has no such edge.
pub fn next_status(from: TransactionStatus, event: LifecycleEvent) -> Option<TransactionStatus> {
    TABLE
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}

/// True if some event moves `from` to `to`.
pub fn is_legal(from: TransactionStatus, to: TransactionStatus) -> bool {
    TABLE.iter().any(|(f, _, t)| *f == from && *t == to)
}

/// Like [`next_status`] but reports a missing edge as [`EngineError::InvalidState`].
pub fn apply(from: TransactionStatus, event: LifecycleEvent) -> Result<TransactionStatus, EngineError> {
    next_status(from, event).ok_or_else(|| {
        EngineError::InvalidState(format!("{:?} is not allowed from status {}", event, from))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn forward_path_reaches_approved() {
        let mut s = Active;
        for e in [
            LifecycleEvent::MatchAccepted,
            LifecycleEvent::SubmittedForReview,
            LifecycleEvent::ReviewerApproved,
        ] {
            s = apply(s, e).unwrap();
        }
        assert_eq!(s, Approved);
    }

    #[test]
    fn no_step_may_be_skipped() {
        assert!(!is_legal(Active, PendingApproval));
        assert!(!is_legal(Active, Approved));
        assert!(!is_legal(Matched, Approved));
        assert!(next_status(Active, LifecycleEvent::ReviewerApproved).is_none());
    }

    #[test]
    fn terminal_states_are_exactly_those_without_exits() {
        let all = [Active, Matched, PendingApproval, Approved, Rejected, Cancelled];
        for from in all {
            let has_exit = all.iter().any(|&to| is_legal(from, to));
            assert_eq!(from.is_terminal(), !has_exit, "{}", from);
        }
    }

    #[test]
    fn release_is_the_only_backward_move() {
        assert_eq!(next_status(Matched, LifecycleEvent::Released), Some(Active));
        assert_eq!(next_status(PendingApproval, LifecycleEvent::Released), Some(Active));
        assert!(!is_legal(Approved, Active));
        assert!(!is_legal(PendingApproval, Matched));
    }

    #[test]
    fn only_active_can_be_cancelled() {
        assert_eq!(next_status(Active, LifecycleEvent::OwnerWithdrew), Some(Cancelled));
        assert!(next_status(Matched, LifecycleEvent::OwnerWithdrew).is_none());
        let err = apply(Matched, LifecycleEvent::OwnerWithdrew).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }
}
