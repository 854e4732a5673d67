//! Pairwise commits: match, submit for review, release, and review outcomes.
//!
//! Every operation here moves both sides of a pairing inside one
//! [`TransactionStore::with_pair`] scope through [`PairScope::commit`]: both
//! compare-and-sets are checked before either record is written, so a commit lands
//! on both sides or on neither. Point reads take the same writers, so outside the
//! scope the two records are always observed in agreeing states.

use log::info;

use crate::candidates::is_compatible;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{self, LifecycleEvent};
use crate::store::{PairScope, TransactionStore, Transition};
use crate::types::{Transaction, TransactionId, TransactionStatus, UserId};

/// Both sides of a pairing after a commit. `transaction` is the side the caller named.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pairing {
    pub transaction: Transaction,
    pub counterpart: Transaction,
}

/// How a rejected review ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectDisposition {
    /// Both sides return to `active` and can be matched again.
    #[default]
    Relist,
    /// Both sides end in `rejected`.
    Close,
}

fn commit_both(
    scope: &PairScope<'_>,
    first: TransactionId,
    second: TransactionId,
    t_first: Transition,
    t_second: Transition,
) -> EngineResult<Pairing> {
    let (a, b) = scope.commit((first, t_first), (second, t_second))?;
    Ok(Pairing {
        transaction: (*a).clone(),
        counterpart: (*b).clone(),
    })
}

/// Pairs `transaction_id` (owned by `requester`) with `candidate_id`.
///
/// Ownership is checked before anything else. Compatibility is re-checked under
/// lock; if either side is no longer `active` the call fails with
/// [`EngineError::StaleState`] and neither record changes.
pub fn create_match(
    store: &TransactionStore,
    transaction_id: TransactionId,
    candidate_id: TransactionId,
    requester: UserId,
) -> EngineResult<Pairing> {
    let own = store.get(transaction_id)?;
    if own.owner != requester {
        return Err(EngineError::Forbidden(format!(
            "user {} does not own transaction {}",
            requester.0, transaction_id.0
        )));
    }
    if candidate_id == transaction_id {
        return Err(EngineError::InvalidState(format!(
            "transaction {} cannot be matched with itself",
            transaction_id.0
        )));
    }
    let to = lifecycle::apply(TransactionStatus::Active, LifecycleEvent::MatchAccepted)?;
    let pairing = store.with_pair(transaction_id, candidate_id, |scope| {
        let t = scope.get(transaction_id)?;
        let c = scope.get(candidate_id)?;
        if !is_compatible(&t, &c) {
            return Err(EngineError::InvalidState(format!(
                "transaction {} is not a compatible counterpart for {}",
                candidate_id.0, transaction_id.0
            )));
        }
        commit_both(
            scope,
            transaction_id,
            candidate_id,
            Transition::new(TransactionStatus::Active, to).with_counterpart(candidate_id),
            Transition::new(TransactionStatus::Active, to).with_counterpart(transaction_id),
        )
    })?;
    info!(
        "match created transaction_id={} counterpart_id={} requester={}",
        transaction_id.0, candidate_id.0, requester.0
    );
    Ok(pairing)
}

/// Fails with [`EngineError::Forbidden`] unless `user` owns either side of
/// `transaction_id`'s pairing. Both sides are read together.
pub fn require_participant(
    store: &TransactionStore,
    transaction_id: TransactionId,
    user: UserId,
) -> EngineResult<Transaction> {
    let (t, counterpart) = store.get_with_counterpart(transaction_id)?;
    if user == t.owner || counterpart.map(|c| c.owner) == Some(user) {
        Ok(t)
    } else {
        Err(EngineError::Forbidden(format!(
            "user {} is not a party to transaction {}",
            user.0, transaction_id.0
        )))
    }
}

/// Applies `event` to both sides of the pairing that `transaction_id` belongs to.
/// Authorization is the caller's job.
fn transition_pairing(
    store: &TransactionStore,
    transaction_id: TransactionId,
    expected: TransactionStatus,
    event: LifecycleEvent,
    reviewer: Option<UserId>,
) -> EngineResult<Pairing> {
    let t = store.get(transaction_id)?;
    if t.status != expected {
        return Err(EngineError::InvalidState(format!(
            "transaction {} is {}, expected {}",
            transaction_id.0, t.status, expected
        )));
    }
    let other = t.counterpart.ok_or_else(|| {
        EngineError::InvalidState(format!("transaction {} has no counterpart", transaction_id.0))
    })?;
    let to = lifecycle::apply(expected, event)?;
    let transition_for = |counterpart: TransactionId| {
        let mut tr = Transition::new(expected, to);
        if to.has_counterpart() {
            tr = tr.with_counterpart(counterpart);
        }
        if let Some(r) = reviewer {
            tr = tr.reviewed_by(r);
        }
        tr
    };
    let pairing = store.with_pair(transaction_id, other, |scope| {
        // Both sides must still point at each other.
        if scope.get(transaction_id)?.counterpart != Some(other) || scope.get(other)?.counterpart != Some(transaction_id) {
            return Err(EngineError::StaleState(format!(
                "pairing {} <-> {} changed concurrently",
                transaction_id.0, other.0
            )));
        }
        commit_both(scope, transaction_id, other, transition_for(other), transition_for(transaction_id))
    })?;
    info!(
        "pairing transition transaction_id={} counterpart_id={} event={:?} status={}",
        transaction_id.0, other.0, event, to
    );
    Ok(pairing)
}

/// `matched → pending_approval` for both sides. Either participant may ask.
pub fn submit_for_review(
    store: &TransactionStore,
    transaction_id: TransactionId,
    requester: UserId,
) -> EngineResult<Pairing> {
    require_participant(store, transaction_id, requester)?;
    transition_pairing(
        store,
        transaction_id,
        TransactionStatus::Matched,
        LifecycleEvent::SubmittedForReview,
        None,
    )
}

/// Dissolves a `matched` pairing: both sides return to `active`. Either participant may ask.
pub fn withdraw_match(
    store: &TransactionStore,
    transaction_id: TransactionId,
    requester: UserId,
) -> EngineResult<Pairing> {
    require_participant(store, transaction_id, requester)?;
    transition_pairing(
        store,
        transaction_id,
        TransactionStatus::Matched,
        LifecycleEvent::Released,
        None,
    )
}

/// `pending_approval → approved` for both sides. Reviewer authorization happens in
/// [`crate::approval`].
pub fn approve_pair(
    store: &TransactionStore,
    transaction_id: TransactionId,
    reviewer: UserId,
) -> EngineResult<Pairing> {
    transition_pairing(
        store,
        transaction_id,
        TransactionStatus::PendingApproval,
        LifecycleEvent::ReviewerApproved,
        Some(reviewer),
    )
}

/// Ends a review negatively, per `disposition`.
pub fn reject_pair(
    store: &TransactionStore,
    transaction_id: TransactionId,
    reviewer: UserId,
    disposition: RejectDisposition,
) -> EngineResult<Pairing> {
    let event = match disposition {
        RejectDisposition::Relist => LifecycleEvent::Released,
        RejectDisposition::Close => LifecycleEvent::ReviewerRejected,
    };
    transition_pairing(
        store,
        transaction_id,
        TransactionStatus::PendingApproval,
        event,
        Some(reviewer),
    )
}

/// Owner withdraws an unmatched transaction: `active → cancelled`.
pub fn cancel(store: &TransactionStore, transaction_id: TransactionId, requester: UserId) -> EngineResult<Transaction> {
    let t = store.get(transaction_id)?;
    if t.owner != requester {
        return Err(EngineError::Forbidden(format!(
            "user {} does not own transaction {}",
            requester.0, transaction_id.0
        )));
    }
    let to = lifecycle::apply(t.status, LifecycleEvent::OwnerWithdrew)?;
    store.transition(transaction_id, TransactionStatus::Active, to, None)
}
