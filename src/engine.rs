//! Single-entry offsetting engine facade.
//!
//! Holds the store, chat log, ratings, and collaborators so the protocol layer can
//! call one object. Every operation takes the acting user explicitly; there is no
//! ambient session. `Engine` is `Send + Sync` and needs no outer lock: concurrency
//! is handled per record inside [`TransactionStore`].

use std::sync::Arc;

use log::warn;
use rust_decimal::Decimal;
use serde_json::json;

use crate::approval;
use crate::audit::{AuditEvent, AuditSink, LogAuditSink};
use crate::candidates;
use crate::chat::{self, ChatLog};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::matching::{self, Pairing, RejectDisposition};
use crate::persistence::PersistedState;
use crate::ratings::RatingBook;
use crate::registry::{CityRegistry, UserDirectory, UserProfile};
use crate::store::{ListFilter, TransactionStore};
use crate::types::{ChatMessage, NewTransaction, Rating, Transaction, TransactionId, UserId};

pub struct Engine {
    config: EngineConfig,
    store: TransactionStore,
    chat: ChatLog,
    ratings: RatingBook,
    directory: Arc<dyn UserDirectory>,
    cities: Arc<dyn CityRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl Engine {
    /// Creates an empty engine.
    pub fn new(config: EngineConfig, directory: Arc<dyn UserDirectory>, cities: Arc<dyn CityRegistry>) -> Self {
        Self {
            config,
            store: TransactionStore::new(Arc::clone(&cities)),
            chat: ChatLog::new(),
            ratings: RatingBook::new(),
            directory,
            cities,
            audit: Arc::new(LogAuditSink),
        }
    }

    /// Rebuilds an engine from persisted state.
    pub fn from_state(
        config: EngineConfig,
        directory: Arc<dyn UserDirectory>,
        cities: Arc<dyn CityRegistry>,
        state: PersistedState,
    ) -> Self {
        let store = TransactionStore::from_snapshot(Arc::clone(&cities), state.store);
        let ratings = RatingBook::from_ratings(&store, state.ratings);
        Self {
            config,
            store,
            chat: ChatLog::from_messages(state.messages),
            ratings,
            directory,
            cities,
            audit: Arc::new(LogAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Current state for persistence.
    pub fn state(&self) -> PersistedState {
        PersistedState {
            store: self.store.snapshot(),
            messages: self.chat.all_messages(),
            ratings: self.ratings.all(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn record<T>(&self, actor: UserId, action: &str, resource: serde_json::Value, result: &EngineResult<T>) {
        if let Err(EngineError::Forbidden(msg)) = result {
            warn!("forbidden action={} actor={}: {}", action, actor.0, msg);
        }
        self.audit.emit(&AuditEvent::now(
            actor.0.to_string(),
            action,
            Some(resource),
            AuditEvent::outcome_of(result),
        ));
    }

    /// Posts a new transaction for `owner`. The owner must be known to the directory.
    pub fn post_transaction(&self, owner: UserId, submission: &NewTransaction) -> EngineResult<Transaction> {
        let result = match self.directory.lookup(owner) {
            Some(_) => self.store.create(owner, submission),
            None => Err(EngineError::NotFound(format!("user {}", owner.0))),
        };
        let id = result.as_ref().ok().map(|t| t.id.0);
        self.record(owner, "transaction_create", json!({ "transaction_id": id }), &result);
        result
    }

    pub fn transaction(&self, id: TransactionId) -> EngineResult<Transaction> {
        self.store.get(id)
    }

    /// Newest first, capped at the configured list limit.
    pub fn list_transactions(&self, filter: &ListFilter) -> Vec<Transaction> {
        self.store.list(filter, self.config.list_limit)
    }

    pub fn transactions_for_owner(&self, owner: UserId) -> Vec<Transaction> {
        let filter = ListFilter {
            owner: Some(owner),
            ..Default::default()
        };
        self.store.list(&filter, self.config.list_limit)
    }

    pub fn list_active(&self) -> Vec<Transaction> {
        self.store.list_active()
    }

    pub fn find_candidates(&self, id: TransactionId) -> EngineResult<Vec<Transaction>> {
        candidates::find_candidates(&self.store, id)
    }

    /// Locks in a pairing. With `auto_submit_for_review` the pairing is moved on to
    /// `pending_approval` right away.
    pub fn create_match(
        &self,
        transaction_id: TransactionId,
        candidate_id: TransactionId,
        requester: UserId,
    ) -> EngineResult<Pairing> {
        let mut result = matching::create_match(&self.store, transaction_id, candidate_id, requester);
        self.record(
            requester,
            "match_create",
            json!({ "transaction_id": transaction_id.0, "candidate_id": candidate_id.0 }),
            &result,
        );
        if result.is_ok() && self.config.auto_submit_for_review {
            result = self.submit_for_review(transaction_id, requester);
        }
        result
    }

    pub fn submit_for_review(&self, transaction_id: TransactionId, requester: UserId) -> EngineResult<Pairing> {
        let result = matching::submit_for_review(&self.store, transaction_id, requester);
        self.record(requester, "review_submit", json!({ "transaction_id": transaction_id.0 }), &result);
        result
    }

    pub fn withdraw_match(&self, transaction_id: TransactionId, requester: UserId) -> EngineResult<Pairing> {
        let result = matching::withdraw_match(&self.store, transaction_id, requester);
        self.record(requester, "match_withdraw", json!({ "transaction_id": transaction_id.0 }), &result);
        result
    }

    pub fn cancel_transaction(&self, transaction_id: TransactionId, requester: UserId) -> EngineResult<Transaction> {
        let result = matching::cancel(&self.store, transaction_id, requester);
        self.record(requester, "transaction_cancel", json!({ "transaction_id": transaction_id.0 }), &result);
        result
    }

    pub fn approve(&self, transaction_id: TransactionId, reviewer: UserId) -> EngineResult<Pairing> {
        let result = approval::approve(&self.store, self.directory.as_ref(), transaction_id, reviewer);
        self.record(reviewer, "review_approve", json!({ "transaction_id": transaction_id.0 }), &result);
        result
    }

    pub fn reject(
        &self,
        transaction_id: TransactionId,
        reviewer: UserId,
        disposition: RejectDisposition,
    ) -> EngineResult<Pairing> {
        let result = approval::reject(&self.store, self.directory.as_ref(), transaction_id, reviewer, disposition);
        self.record(
            reviewer,
            "review_reject",
            json!({ "transaction_id": transaction_id.0, "disposition": disposition }),
            &result,
        );
        result
    }

    pub fn can_message(&self, transaction_id: TransactionId, user: UserId) -> bool {
        chat::can_message(&self.store, transaction_id, user)
    }

    pub fn send_message(
        &self,
        transaction_id: TransactionId,
        sender: UserId,
        receiver: Option<UserId>,
        body: &str,
    ) -> EngineResult<ChatMessage> {
        let result = self.chat.send(&self.store, transaction_id, sender, receiver, body);
        if result.is_err() {
            self.record(sender, "chat_send", json!({ "transaction_id": transaction_id.0 }), &result);
        }
        result
    }

    pub fn transcript(&self, transaction_id: TransactionId, requester: UserId) -> EngineResult<Vec<ChatMessage>> {
        let result = self.chat.read(&self.store, transaction_id, requester);
        if result.is_err() {
            self.record(requester, "chat_read", json!({ "transaction_id": transaction_id.0 }), &result);
        }
        result
    }

    pub fn rate(&self, transaction_id: TransactionId, rater: UserId, score: u8, comment: &str) -> EngineResult<Rating> {
        let result = self.ratings.rate(&self.store, transaction_id, rater, score, comment);
        self.record(rater, "rating_create", json!({ "transaction_id": transaction_id.0 }), &result);
        result
    }

    pub fn ratings_for(&self, user: UserId) -> Vec<Rating> {
        self.ratings.received_by(user)
    }

    pub fn average_rating(&self, user: UserId) -> Option<Decimal> {
        self.ratings.average_for(user)
    }

    pub fn user(&self, id: UserId) -> EngineResult<UserProfile> {
        self.directory
            .lookup(id)
            .ok_or_else(|| EngineError::NotFound(format!("user {}", id.0)))
    }

    pub fn cities(&self) -> Vec<String> {
        self.cities.cities()
    }
}
