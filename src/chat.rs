//! Chat gate and per-pairing message log.
//!
//! Messaging is open only while a pairing is `matched` or `pending_approval`, and
//! only to the two owners. The receiver of a message is always the other
//! participant, looked up from the pairing; a sender cannot address anyone else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::info;

use crate::error::{EngineError, EngineResult};
use crate::store::TransactionStore;
use crate::types::{now_millis, ChatMessage, MessageId, PairingKey, Transaction, TransactionId, TransactionStatus, UserId};

/// Longest accepted message body, in characters.
pub const MAX_BODY_CHARS: usize = 4000;

/// The pairing `t` belongs to and the two owners, if `t` is in a chat-enabled
/// state. Owners are returned as `(owner of t, owner of counterpart)`.
/// `counterpart` must come from the same read as `t`.
fn open_pairing(t: &Transaction, counterpart: Option<&Transaction>) -> Option<(PairingKey, UserId, UserId)> {
    if !matches!(t.status, TransactionStatus::Matched | TransactionStatus::PendingApproval) {
        return None;
    }
    let counterpart = counterpart?;
    Some((PairingKey::new(t.id, counterpart.id), t.owner, counterpart.owner))
}

/// True if `user` may exchange messages on `transaction_id`'s pairing right now.
pub fn can_message(store: &TransactionStore, transaction_id: TransactionId, user: UserId) -> bool {
    let Ok((t, counterpart)) = store.get_with_counterpart(transaction_id) else {
        return false;
    };
    match open_pairing(&t, counterpart.as_ref()) {
        Some((_, a, b)) => user == a || user == b,
        None => false,
    }
}

/// Resolves the pairing and the other participant for `user`, or `Forbidden`.
fn authorize(
    store: &TransactionStore,
    transaction_id: TransactionId,
    user: UserId,
) -> EngineResult<(PairingKey, UserId)> {
    let (t, counterpart) = store.get_with_counterpart(transaction_id)?;
    let denied = || {
        EngineError::Forbidden(format!(
            "user {} may not message on transaction {} (status {})",
            user.0, transaction_id.0, t.status
        ))
    };
    let (key, a, b) = open_pairing(&t, counterpart.as_ref()).ok_or_else(&denied)?;
    if user == a {
        Ok((key, b))
    } else if user == b {
        Ok((key, a))
    } else {
        Err(denied())
    }
}

/// Append-only transcripts keyed by pairing.
pub struct ChatLog {
    transcripts: RwLock<HashMap<PairingKey, Arc<Mutex<Vec<ChatMessage>>>>>,
    next_id: AtomicU64,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLog {
    pub fn new() -> Self {
        Self {
            transcripts: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn transcript_for(&self, key: PairingKey) -> Arc<Mutex<Vec<ChatMessage>>> {
        if let Some(t) = self.transcripts.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Arc::clone(t);
        }
        let mut map = self.transcripts.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(key).or_default())
    }

    /// Stores a message from `sender`. `receiver`, if given, must be the other participant.
    pub fn send(
        &self,
        store: &TransactionStore,
        transaction_id: TransactionId,
        sender: UserId,
        receiver: Option<UserId>,
        body: &str,
    ) -> EngineResult<ChatMessage> {
        let (key, other) = authorize(store, transaction_id, sender)?;
        if let Some(r) = receiver {
            if r != other {
                return Err(EngineError::Forbidden(format!(
                    "user {} is not the counterpart on transaction {}",
                    r.0, transaction_id.0
                )));
            }
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::Validation("message body must not be empty".into()));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(EngineError::Validation(format!(
                "message body exceeds {} characters",
                MAX_BODY_CHARS
            )));
        }
        let transcript = self.transcript_for(key);
        let mut messages = transcript.lock().unwrap_or_else(PoisonError::into_inner);
        let message = ChatMessage {
            id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            pairing: key,
            sequence: messages.len() as u64 + 1,
            sender,
            receiver: other,
            body: body.to_string(),
            timestamp: now_millis(),
        };
        messages.push(message.clone());
        info!(
            "chat message stored pairing={}-{} sequence={} sender={}",
            key.0 .0, key.1 .0, message.sequence, sender.0
        );
        Ok(message)
    }

    /// Messages of `transaction_id`'s pairing in sequence order, if `requester` may read them.
    pub fn read(
        &self,
        store: &TransactionStore,
        transaction_id: TransactionId,
        requester: UserId,
    ) -> EngineResult<Vec<ChatMessage>> {
        let (key, _) = authorize(store, transaction_id, requester)?;
        let transcripts = self.transcripts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(transcripts
            .get(&key)
            .map(|t| t.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default())
    }

    /// Every stored message, grouped by pairing. For snapshots.
    pub fn all_messages(&self) -> Vec<ChatMessage> {
        let transcripts = self.transcripts.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<ChatMessage> = transcripts
            .values()
            .flat_map(|t| t.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        out.sort_by_key(|m| (m.pairing, m.sequence));
        out
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        let log = Self::new();
        let max_id = messages.iter().map(|m| m.id.0).max().unwrap_or(0);
        log.next_id.store(max_id + 1, Ordering::SeqCst);
        {
            let mut map = log.transcripts.write().unwrap_or_else(PoisonError::into_inner);
            for m in messages {
                map.entry(m.pairing)
                    .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(m);
            }
            for t in map.values() {
                t.lock().unwrap_or_else(PoisonError::into_inner).sort_by_key(|m| m.sequence);
            }
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{approve_pair, create_match, submit_for_review};
    use crate::registry::StaticCities;
    use crate::types::NewTransaction;
    use rust_decimal::Decimal;

    fn init_log() {
        let _ = env_logger::try_init();
    }

    fn matched_pair() -> (TransactionStore, Transaction, Transaction) {
        let store = TransactionStore::new(Arc::new(StaticCities::major_cities()));
        let mut submission = NewTransaction {
            title: "Gift".into(),
            description: "Birthday".into(),
            amount: Decimal::from(50),
            currency: "EUR".into(),
            from_city: "Paris".into(),
            to_city: "Tokyo".into(),
            recipient_name: "Kenji".into(),
            recipient_details: "Bank 1".into(),
        };
        let x = store.create(UserId(1), &submission).unwrap();
        submission.from_city = "Tokyo".into();
        submission.to_city = "Paris".into();
        let y = store.create(UserId(2), &submission).unwrap();
        (store, x, y)
    }

    #[test]
    fn gate_denies_active_and_outsiders() {
        init_log();
        let (store, x, y) = matched_pair();
        let log = ChatLog::new();
        assert!(!can_message(&store, x.id, UserId(1)));
        assert_eq!(log.send(&store, x.id, UserId(1), None, "hi").unwrap_err().kind(), "forbidden");
        create_match(&store, x.id, y.id, UserId(1)).unwrap();
        assert!(can_message(&store, x.id, UserId(1)));
        assert!(can_message(&store, x.id, UserId(2)));
        assert!(!can_message(&store, x.id, UserId(3)));
        assert_eq!(log.send(&store, y.id, UserId(3), None, "hi").unwrap_err().kind(), "forbidden");
        assert_eq!(log.read(&store, x.id, UserId(3)).unwrap_err().kind(), "forbidden");
    }

    #[test]
    fn receiver_is_derived_from_pairing() {
        init_log();
        let (store, x, y) = matched_pair();
        create_match(&store, x.id, y.id, UserId(1)).unwrap();
        let log = ChatLog::new();
        let m = log.send(&store, x.id, UserId(1), None, "hello").unwrap();
        assert_eq!(m.receiver, UserId(2));
        let err = log.send(&store, x.id, UserId(1), Some(UserId(7)), "psst").unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        let reply = log.send(&store, y.id, UserId(2), Some(UserId(1)), "hi back").unwrap();
        assert_eq!(reply.sequence, 2);
        let from_x = log.read(&store, x.id, UserId(2)).unwrap();
        let from_y = log.read(&store, y.id, UserId(1)).unwrap();
        assert_eq!(from_x, from_y, "both sides share one transcript");
        assert_eq!(from_x.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn chat_closes_after_approval() {
        init_log();
        let (store, x, y) = matched_pair();
        create_match(&store, x.id, y.id, UserId(1)).unwrap();
        submit_for_review(&store, x.id, UserId(1)).unwrap();
        assert!(can_message(&store, x.id, UserId(2)));
        approve_pair(&store, x.id, UserId(99)).unwrap();
        assert!(!can_message(&store, x.id, UserId(1)));
        let log = ChatLog::new();
        assert_eq!(log.read(&store, x.id, UserId(1)).unwrap_err().kind(), "forbidden");
    }

    #[test]
    fn empty_body_is_validation_error() {
        init_log();
        let (store, x, y) = matched_pair();
        create_match(&store, x.id, y.id, UserId(1)).unwrap();
        let log = ChatLog::new();
        assert_eq!(log.send(&store, x.id, UserId(1), None, "   ").unwrap_err().kind(), "validation");
    }

    #[test]
    fn from_messages_keeps_sequence_and_ids() {
        init_log();
        let (store, x, y) = matched_pair();
        create_match(&store, x.id, y.id, UserId(1)).unwrap();
        let log = ChatLog::new();
        log.send(&store, x.id, UserId(1), None, "one").unwrap();
        log.send(&store, x.id, UserId(2), None, "two").unwrap();
        let restored = ChatLog::from_messages(log.all_messages());
        let third = restored.send(&store, y.id, UserId(2), None, "three").unwrap();
        assert_eq!(third.sequence, 3);
        assert_eq!(third.id, MessageId(3));
    }
}
