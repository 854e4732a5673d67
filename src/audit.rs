//! Structured audit trail for material actions.
//!
//! Events: transaction create/cancel, match create/withdraw, review submit/approve/reject,
//! chat send/read denials, ratings. Format: JSON with timestamp, actor, action, resource,
//! outcome. Sink: the `log` facade under target `audit`, or in-memory for tests.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::EngineError;

/// Single audit record: one line of JSON per event.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    /// Unix timestamp (seconds since epoch).
    pub timestamp_secs: u64,
    /// Acting user id, or "system".
    pub actor: String,
    /// Action type, e.g. match_create, review_approve.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
    /// "success" or the error kind (validation, forbidden, stale_state, ...).
    pub outcome: String,
}

impl AuditEvent {
    pub fn now(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource: Option<serde_json::Value>,
        outcome: impl Into<String>,
    ) -> Self {
        let timestamp_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            timestamp_secs,
            actor: actor.into(),
            action: action.into(),
            resource,
            outcome: outcome.into(),
        }
    }

    /// Outcome string for an operation result.
    pub fn outcome_of<T>(result: &Result<T, EngineError>) -> &'static str {
        match result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        }
    }
}

/// Sink for audit events.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Writes one JSON line per event through `log` (target `audit`).
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            log::info!(target: "audit", "{}", line);
        }
    }
}

/// In-memory sink that stores events for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_uses_error_kind() {
        let ok: Result<(), EngineError> = Ok(());
        let denied: Result<(), EngineError> = Err(EngineError::Forbidden("no".into()));
        assert_eq!(AuditEvent::outcome_of(&ok), "success");
        assert_eq!(AuditEvent::outcome_of(&denied), "forbidden");
    }

    #[test]
    fn in_memory_sink_shares_buffer_across_clones() {
        let sink = InMemoryAuditSink::new();
        let other = sink.clone();
        other.emit(&AuditEvent::now("1", "match_create", None, "success"));
        assert_eq!(sink.events().len(), 1);
        let json = serde_json::to_value(&sink.events()[0]).unwrap();
        assert!(json.get("resource").is_none());
        sink.clear();
        assert!(other.events().is_empty());
    }
}
