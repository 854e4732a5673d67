//! Core types and IDs for the offsetting engine.
//!
//! All identifiers are newtype wrappers. [`Transaction`] is the central record;
//! [`NewTransaction`] is what a caller submits. [`TransactionStatus`] is the closed
//! set of lifecycle states (transitions live in [`crate::lifecycle`]).

use rust_decimal::Decimal;

/// Unique transaction identifier. Assigned by the store, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TransactionId(pub u64);

/// Verified user identity, supplied by the identity collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub u64);

/// Chat message identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub u64);

/// Supported currencies. Matching only pairs transactions in the same currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CNY,
    CHF,
    CAD,
    AUD,
    SGD,
    HKD,
    AED,
    INR,
}

impl Currency {
    pub const ALL: [Currency; 12] = [
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::JPY,
        Currency::CNY,
        Currency::CHF,
        Currency::CAD,
        Currency::AUD,
        Currency::SGD,
        Currency::HKD,
        Currency::AED,
        Currency::INR,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CNY => "CNY",
            Currency::CHF => "CHF",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::SGD => "SGD",
            Currency::HKD => "HKD",
            Currency::AED => "AED",
            Currency::INR => "INR",
        }
    }

    /// Parses an ISO code, case-insensitive.
    pub fn from_code(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|c| c.code().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Transaction lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Matched,
    PendingApproval,
    Approved,
    Rejected,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Matched => "matched",
            TransactionStatus::PendingApproval => "pending_approval",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(TransactionStatus::Active),
            "matched" => Some(TransactionStatus::Matched),
            "pending_approval" => Some(TransactionStatus::PendingApproval),
            "approved" => Some(TransactionStatus::Approved),
            "rejected" => Some(TransactionStatus::Rejected),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses in which a transaction belongs to a live pairing and must record its counterpart.
    pub fn has_counterpart(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Matched | TransactionStatus::PendingApproval | TransactionStatus::Approved
        )
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Approved | TransactionStatus::Rejected | TransactionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction submission. Content fields are write-once; validated by the store.
///
/// `currency` stays a string here so an unknown code is a validation error rather
/// than a deserialization failure.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct NewTransaction {
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub from_city: String,
    pub to_city: String,
    pub recipient_name: String,
    pub recipient_details: String,
}

/// Stored transaction record.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner: UserId,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub from_city: String,
    pub to_city: String,
    pub recipient_name: String,
    pub recipient_details: String,
    pub status: TransactionStatus,
    pub counterpart: Option<TransactionId>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<u64>,
}

impl Transaction {
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }
}

/// Identifies one pairing independent of which side is asking: the two
/// transaction ids in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PairingKey(pub TransactionId, pub TransactionId);

impl PairingKey {
    pub fn new(a: TransactionId, b: TransactionId) -> Self {
        if a <= b {
            PairingKey(a, b)
        } else {
            PairingKey(b, a)
        }
    }
}

/// Chat message within a pairing. Immutable once stored.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub pairing: PairingKey,
    /// Position in the pairing's transcript, starting at 1.
    pub sequence: u64,
    pub sender: UserId,
    pub receiver: UserId,
    pub body: String,
    pub timestamp: u64,
}

/// A participant's rating of their counterpart after an approved pairing.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rating {
    pub transaction_id: TransactionId,
    pub rater: UserId,
    pub rated_user: UserId,
    pub score: u8,
    pub comment: String,
    pub created_at: u64,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
