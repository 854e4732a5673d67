//! Review boundary: the administrative approve/reject decision.
//!
//! The decision itself is made elsewhere. The engine only checks that the caller
//! holds the reviewer role and then applies the outcome to both sides.

use crate::error::{EngineError, EngineResult};
use crate::matching::{self, Pairing, RejectDisposition};
use crate::registry::UserDirectory;
use crate::store::TransactionStore;
use crate::types::{TransactionId, UserId};

fn require_reviewer(directory: &dyn UserDirectory, reviewer: UserId) -> EngineResult<()> {
    if directory.is_reviewer(reviewer) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("user {} is not a reviewer", reviewer.0)))
    }
}

pub fn approve(
    store: &TransactionStore,
    directory: &dyn UserDirectory,
    transaction_id: TransactionId,
    reviewer: UserId,
) -> EngineResult<Pairing> {
    require_reviewer(directory, reviewer)?;
    matching::approve_pair(store, transaction_id, reviewer)
}

pub fn reject(
    store: &TransactionStore,
    directory: &dyn UserDirectory,
    transaction_id: TransactionId,
    reviewer: UserId,
    disposition: RejectDisposition,
) -> EngineResult<Pairing> {
    require_reviewer(directory, reviewer)?;
    matching::reject_pair(store, transaction_id, reviewer, disposition)
}
