//! Candidate search: which `active` transactions could offset a given one.
//!
//! Read-only. Results may be stale by the time the caller acts on them; the
//! coordinator re-checks [`is_compatible`] under lock before committing.

use log::debug;

use crate::error::{EngineError, EngineResult};
use crate::store::TransactionStore;
use crate::types::{Transaction, TransactionId};

/// Structural compatibility: opposite city pair, different owner, same currency,
/// different record. Status is not considered here.
pub fn is_compatible(t: &Transaction, c: &Transaction) -> bool {
    c.id != t.id
        && c.owner != t.owner
        && c.currency == t.currency
        && c.from_city == t.to_city
        && c.to_city == t.from_city
}

/// Compatible `active` counterparts of `id`, closest amount first, then oldest.
///
/// Amounts need not be equal; partial offsets are allowed.
pub fn find_candidates(store: &TransactionStore, id: TransactionId) -> EngineResult<Vec<Transaction>> {
    let target = store.load(id)?;
    if !target.is_active() {
        return Err(EngineError::InvalidState(format!(
            "transaction {} is {}, candidates are only searched for active transactions",
            id.0, target.status
        )));
    }
    let mut out: Vec<Transaction> = store
        .list_active()
        .into_iter()
        .filter(|c| is_compatible(&target, c))
        .collect();
    out.sort_by(|a, b| {
        let da = (a.amount - target.amount).abs();
        let db = (b.amount - target.amount).abs();
        da.cmp(&db).then((a.created_at, a.id).cmp(&(b.created_at, b.id)))
    });
    debug!("candidate search transaction_id={} found={}", id.0, out.len());
    Ok(out)
}
