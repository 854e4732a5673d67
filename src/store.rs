//! Transaction store: the only owner of the status field.
//!
//! Each record lives in a slot holding an [`ArcSwap`] of the current version plus a
//! writer mutex. Writes go through a compare-and-set on status while holding that
//! slot's writer, so unrelated transactions never contend.
//! [`TransactionStore::with_pair`] holds two writers, acquired in ascending id
//! order, for the pairwise commits in [`crate::matching`].
//!
//! Point reads ([`TransactionStore::get`], [`TransactionStore::get_with_counterpart`])
//! take the writer briefly, so they never land between the two halves of a pairwise
//! commit. Scans (`list_active`, `list`, candidate search) stay lock-free and may
//! see a commit half-way; the commit re-checks everything under lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use arc_swap::ArcSwap;
use log::info;

use crate::error::{EngineError, EngineResult};
use crate::lifecycle;
use crate::registry::CityRegistry;
use crate::types::{now_millis, Currency, NewTransaction, Transaction, TransactionId, TransactionStatus, UserId};

struct Slot {
    current: ArcSwap<Transaction>,
    writer: Mutex<()>,
}

impl Slot {
    fn new(tx: Transaction) -> Self {
        Self {
            current: ArcSwap::from_pointee(tx),
            writer: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current version, read under the writer.
    fn read(&self) -> Arc<Transaction> {
        let _writer = self.lock();
        self.current.load_full()
    }
}

/// A status write: expected prior status, target status, and what the record
/// links to afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub expected: TransactionStatus,
    pub to: TransactionStatus,
    pub counterpart: Option<TransactionId>,
    pub reviewed_by: Option<UserId>,
}

impl Transition {
    pub fn new(expected: TransactionStatus, to: TransactionStatus) -> Self {
        Self {
            expected,
            to,
            counterpart: None,
            reviewed_by: None,
        }
    }

    pub fn with_counterpart(mut self, counterpart: TransactionId) -> Self {
        self.counterpart = Some(counterpart);
        self
    }

    pub fn reviewed_by(mut self, reviewer: UserId) -> Self {
        self.reviewed_by = Some(reviewer);
        self
    }

    fn check(&self) -> EngineResult<()> {
        if !lifecycle::is_legal(self.expected, self.to) {
            return Err(EngineError::InvalidState(format!(
                "transition {} -> {} is not allowed",
                self.expected, self.to
            )));
        }
        if self.to.has_counterpart() != self.counterpart.is_some() {
            return Err(EngineError::InvalidState(format!(
                "status {} {} a counterpart",
                self.to,
                if self.to.has_counterpart() { "requires" } else { "must not carry" }
            )));
        }
        Ok(())
    }
}

/// Checks `t` against the stored version and builds the next one without storing
/// it. Caller must hold `slot.writer`.
fn prepare(slot: &Slot, t: &Transition) -> EngineResult<Arc<Transaction>> {
    let current = slot.current.load_full();
    if current.status != t.expected {
        return Err(EngineError::StaleState(format!(
            "transaction {} is {}, expected {}",
            current.id.0, current.status, t.expected
        )));
    }
    if t.expected.has_counterpart() && t.to.has_counterpart() && current.counterpart != t.counterpart {
        return Err(EngineError::StaleState(format!(
            "transaction {} is paired with {:?}, not {:?}",
            current.id.0, current.counterpart, t.counterpart
        )));
    }
    let mut next = (*current).clone();
    next.status = t.to;
    next.counterpart = t.counterpart;
    next.updated_at = now_millis().max(current.updated_at);
    if let Some(reviewer) = t.reviewed_by {
        next.reviewed_by = Some(reviewer);
        next.reviewed_at = Some(next.updated_at);
    }
    Ok(Arc::new(next))
}

/// Caller must hold `slot.writer`.
fn publish(slot: &Slot, next: &Arc<Transaction>, from: TransactionStatus) {
    slot.current.store(Arc::clone(next));
    info!(
        "transition transaction_id={} from={} to={} counterpart={:?}",
        next.id.0, from, next.status, next.counterpart.map(|c| c.0)
    );
}

/// Caller must hold `slot.writer`.
fn write_locked(slot: &Slot, t: &Transition) -> EngineResult<Arc<Transaction>> {
    let next = prepare(slot, t)?;
    publish(slot, &next, t.expected);
    Ok(next)
}

/// Two records locked together. Obtained from [`TransactionStore::with_pair`];
/// no other writer can touch either record while the scope is alive.
pub struct PairScope<'a> {
    first: (TransactionId, &'a Slot),
    second: (TransactionId, &'a Slot),
}

impl<'a> PairScope<'a> {
    fn slot(&self, id: TransactionId) -> EngineResult<&'a Slot> {
        if id == self.first.0 {
            Ok(self.first.1)
        } else if id == self.second.0 {
            Ok(self.second.1)
        } else {
            Err(EngineError::NotFound(format!("transaction {} is not part of this pairing", id.0)))
        }
    }

    /// Current version of one of the two records.
    pub fn get(&self, id: TransactionId) -> EngineResult<Arc<Transaction>> {
        Ok(self.slot(id)?.current.load_full())
    }

    /// Compare-and-set on both records as one unit. Both checks run before either
    /// record is written, so a failure leaves both exactly as they were.
    pub fn commit(
        &self,
        first: (TransactionId, Transition),
        second: (TransactionId, Transition),
    ) -> EngineResult<(Arc<Transaction>, Arc<Transaction>)> {
        if first.0 == second.0 {
            return Err(EngineError::InvalidState(format!(
                "transaction {} cannot be committed twice in one pairing",
                first.0 .0
            )));
        }
        first.1.check()?;
        second.1.check()?;
        let (slot_a, slot_b) = (self.slot(first.0)?, self.slot(second.0)?);
        let a = prepare(slot_a, &first.1)?;
        let b = prepare(slot_b, &second.1)?;
        publish(slot_a, &a, first.1.expected);
        publish(slot_b, &b, second.1.expected);
        Ok((a, b))
    }
}

/// Serializable copy of every record plus the id counter.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct StoreSnapshot {
    pub next_id: u64,
    pub transactions: Vec<Transaction>,
}

/// Listing filter for [`TransactionStore::list`].
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ListFilter {
    /// Matches either endpoint of the transfer.
    pub city: Option<String>,
    pub status: Option<TransactionStatus>,
    pub owner: Option<UserId>,
}

pub struct TransactionStore {
    slots: RwLock<BTreeMap<TransactionId, Arc<Slot>>>,
    next_id: AtomicU64,
    cities: Arc<dyn CityRegistry>,
}

impl TransactionStore {
    pub fn new(cities: Arc<dyn CityRegistry>) -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            cities,
        }
    }

    /// Validates a submission. Returns the parsed currency.
    pub fn validate(&self, submission: &NewTransaction) -> EngineResult<Currency> {
        let text_fields = [
            ("title", &submission.title),
            ("description", &submission.description),
            ("from_city", &submission.from_city),
            ("to_city", &submission.to_city),
            ("recipient_name", &submission.recipient_name),
            ("recipient_details", &submission.recipient_details),
        ];
        for (name, value) in text_fields {
            if value.trim().is_empty() {
                return Err(EngineError::Validation(format!("{} must not be empty", name)));
            }
        }
        if submission.amount <= rust_decimal::Decimal::ZERO {
            return Err(EngineError::Validation("amount must be positive".into()));
        }
        let currency = Currency::from_code(&submission.currency)
            .ok_or_else(|| EngineError::Validation(format!("unsupported currency {}", submission.currency)))?;
        let from = submission.from_city.trim();
        let to = submission.to_city.trim();
        if from == to {
            return Err(EngineError::Validation("from_city and to_city must differ".into()));
        }
        for city in [from, to] {
            if !self.cities.contains(city) {
                return Err(EngineError::Validation(format!("unknown city {}", city)));
            }
        }
        Ok(currency)
    }

    /// Validates and stores a new transaction in `active`.
    pub fn create(&self, owner: UserId, submission: &NewTransaction) -> EngineResult<Transaction> {
        let currency = self.validate(submission)?;
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = now_millis();
        let tx = Transaction {
            id,
            owner,
            title: submission.title.trim().to_string(),
            description: submission.description.trim().to_string(),
            amount: submission.amount.normalize(),
            currency,
            from_city: submission.from_city.trim().to_string(),
            to_city: submission.to_city.trim().to_string(),
            recipient_name: submission.recipient_name.trim().to_string(),
            recipient_details: submission.recipient_details.trim().to_string(),
            status: TransactionStatus::Active,
            counterpart: None,
            created_at: now,
            updated_at: now,
            reviewed_by: None,
            reviewed_at: None,
        };
        slots.insert(id, Arc::new(Slot::new(tx.clone())));
        info!(
            "transaction created transaction_id={} owner={} amount={} currency={} from={} to={}",
            id.0, owner.0, tx.amount, tx.currency, tx.from_city, tx.to_city
        );
        Ok(tx)
    }

    fn slot(&self, id: TransactionId) -> EngineResult<Arc<Slot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("transaction {}", id.0)))
    }

    pub fn get(&self, id: TransactionId) -> EngineResult<Transaction> {
        Ok((*self.slot(id)?.read()).clone())
    }

    /// Lock-free read. May observe a pairwise commit half-way; for candidate search,
    /// which re-checks at commit time anyway.
    pub fn load(&self, id: TransactionId) -> EngineResult<Transaction> {
        Ok((*self.slot(id)?.current.load_full()).clone())
    }

    /// `id` and the record it is paired with, read together under both writers so
    /// the two always agree.
    pub fn get_with_counterpart(&self, id: TransactionId) -> EngineResult<(Transaction, Option<Transaction>)> {
        let slot = self.slot(id)?;
        loop {
            let seen = slot.read();
            let Some(cp) = seen.counterpart else {
                return Ok(((*seen).clone(), None));
            };
            let other = self.slot(cp)?;
            let (lo, hi) = if id < cp { (&slot, &other) } else { (&other, &slot) };
            let _lo = lo.lock();
            let _hi = hi.lock();
            let t = slot.current.load_full();
            if t.counterpart != Some(cp) {
                continue;
            }
            let c = other.current.load_full();
            return Ok(((*t).clone(), Some((*c).clone())));
        }
    }

    fn all(&self) -> Vec<Arc<Transaction>> {
        let slots: Vec<Arc<Slot>> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots.iter().map(|s| s.current.load_full()).collect()
    }

    /// Fresh read of every `active` transaction, oldest first.
    pub fn list_active(&self) -> Vec<Transaction> {
        let mut active: Vec<Transaction> = self
            .all()
            .into_iter()
            .filter(|t| t.is_active())
            .map(|t| (*t).clone())
            .collect();
        active.sort_by_key(|t| (t.created_at, t.id));
        active
    }

    /// Transactions matching `filter`, newest first, at most `limit`.
    pub fn list(&self, filter: &ListFilter, limit: usize) -> Vec<Transaction> {
        let mut out: Vec<Transaction> = self
            .all()
            .into_iter()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.owner.map_or(true, |o| t.owner == o))
            .filter(|t| {
                filter
                    .city
                    .as_deref()
                    .map_or(true, |c| t.from_city == c || t.to_city == c)
            })
            .map(|t| (*t).clone())
            .collect();
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out.truncate(limit);
        out
    }

    /// Compare-and-set on status: succeeds only if the record is currently `expected`.
    pub fn transition(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        to: TransactionStatus,
        counterpart: Option<TransactionId>,
    ) -> EngineResult<Transaction> {
        let t = Transition {
            expected,
            to,
            counterpart,
            reviewed_by: None,
        };
        t.check()?;
        let slot = self.slot(id)?;
        let _writer = slot.lock();
        Ok((*write_locked(&slot, &t)?).clone())
    }

    /// Runs `f` with both records locked. Writers are acquired in ascending id order.
    pub fn with_pair<R>(
        &self,
        a: TransactionId,
        b: TransactionId,
        f: impl FnOnce(&PairScope<'_>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        if a == b {
            return Err(EngineError::InvalidState(format!(
                "transaction {} cannot be paired with itself",
                a.0
            )));
        }
        let slot_a = self.slot(a)?;
        let slot_b = self.slot(b)?;
        let (lo, hi) = if a < b { (&slot_a, &slot_b) } else { (&slot_b, &slot_a) };
        let _lo = lo.lock();
        let _hi = hi.lock();
        let scope = PairScope {
            first: (a, slot_a.as_ref()),
            second: (b, slot_b.as_ref()),
        };
        f(&scope)
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            transactions: self.all().into_iter().map(|t| (*t).clone()).collect(),
        }
    }

    /// Rebuilds a store from a snapshot. The id counter never goes below the
    /// highest restored id.
    pub fn from_snapshot(cities: Arc<dyn CityRegistry>, snapshot: StoreSnapshot) -> Self {
        let max_id = snapshot.transactions.iter().map(|t| t.id.0).max().unwrap_or(0);
        let slots = snapshot
            .transactions
            .into_iter()
            .map(|t| (t.id, Arc::new(Slot::new(t))))
            .collect();
        Self {
            slots: RwLock::new(slots),
            next_id: AtomicU64::new(snapshot.next_id.max(max_id + 1)),
            cities,
        }
    }
}
