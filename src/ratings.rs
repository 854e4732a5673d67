//! Counterpart ratings after an approved pairing.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use log::info;
use rust_decimal::Decimal;

use crate::error::{EngineError, EngineResult};
use crate::store::TransactionStore;
use crate::types::{now_millis, PairingKey, Rating, TransactionId, TransactionStatus, UserId};

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

fn pairing_of(id: TransactionId, counterpart: Option<TransactionId>) -> PairingKey {
    PairingKey::new(id, counterpart.unwrap_or(id))
}

/// One rating per (pairing, rater).
#[derive(Default)]
pub struct RatingBook {
    ratings: RwLock<HashMap<(PairingKey, UserId), Rating>>,
}

impl RatingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// `rater` rates the owner of the other side of `transaction_id`'s pairing.
    pub fn rate(
        &self,
        store: &TransactionStore,
        transaction_id: TransactionId,
        rater: UserId,
        score: u8,
        comment: &str,
    ) -> EngineResult<Rating> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(EngineError::Validation(format!(
                "score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }
        let (t, counterpart) = store.get_with_counterpart(transaction_id)?;
        let counterpart_owner = counterpart.map(|c| c.owner);
        let rated_user = (if rater == t.owner {
            counterpart_owner
        } else if counterpart_owner == Some(rater) {
            Some(t.owner)
        } else {
            None
        })
        .ok_or_else(|| {
            EngineError::Forbidden(format!(
                "user {} is not a party to transaction {}",
                rater.0, transaction_id.0
            ))
        })?;
        if t.status != TransactionStatus::Approved {
            return Err(EngineError::InvalidState(format!(
                "transaction {} is {}, ratings open after approval",
                transaction_id.0, t.status
            )));
        }
        let key = (pairing_of(t.id, t.counterpart), rater);
        let mut ratings = self.ratings.write().unwrap_or_else(PoisonError::into_inner);
        if ratings.contains_key(&key) {
            return Err(EngineError::InvalidState(format!(
                "user {} already rated this pairing",
                rater.0
            )));
        }
        let rating = Rating {
            transaction_id,
            rater,
            rated_user,
            score,
            comment: comment.trim().to_string(),
            created_at: now_millis(),
        };
        ratings.insert(key, rating.clone());
        info!(
            "rating stored transaction_id={} rater={} rated_user={} score={}",
            transaction_id.0, rater.0, rated_user.0, score
        );
        Ok(rating)
    }

    /// Ratings received by `user`, newest first.
    pub fn received_by(&self, user: UserId) -> Vec<Rating> {
        let mut out: Vec<Rating> = self
            .ratings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.rated_user == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Mean score received by `user`, rounded to one decimal place.
    pub fn average_for(&self, user: UserId) -> Option<Decimal> {
        let received = self.received_by(user);
        if received.is_empty() {
            return None;
        }
        let total: Decimal = received.iter().map(|r| Decimal::from(r.score)).sum();
        Some((total / Decimal::from(received.len())).round_dp(1))
    }

    pub fn all(&self) -> Vec<Rating> {
        self.ratings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Rebuilds the book; `store` supplies each rated transaction's counterpart.
    pub fn from_ratings(store: &TransactionStore, ratings: Vec<Rating>) -> Self {
        let map = ratings
            .into_iter()
            .map(|r| {
                let counterpart = store.get(r.transaction_id).ok().and_then(|t| t.counterpart);
                ((pairing_of(r.transaction_id, counterpart), r.rater), r)
            })
            .collect();
        Self {
            ratings: RwLock::new(map),
        }
    }
}
