//! # Offset Exchange
//!
//! Matching and lifecycle engine for offsetting transfers: a user moving money from
//! city A to city B is paired with one moving money from B to A, so both can pay
//! locally. The engine indexes open transactions, finds compatible counterparts,
//! atomically reserves a pairing, walks both sides through review, and gates chat
//! between the two parties on the pairing's state.
//!
//! ## Entry point
//!
//! Use [`Engine`] as the single entry point: create with [`Engine::new`], then
//! [`Engine::post_transaction`], [`Engine::find_candidates`], [`Engine::create_match`],
//! [`Engine::submit_for_review`], [`Engine::approve`], and the chat operations.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use offset_exchange::{Engine, EngineConfig, NewTransaction, TransactionStatus};
//! use offset_exchange::registry::{InMemoryDirectory, Role, StaticCities};
//! use rust_decimal::Decimal;
//!
//! let directory = InMemoryDirectory::new();
//! let alice = directory.register("alice", Role::User).unwrap();
//! let bob = directory.register("bob", Role::User).unwrap();
//! let engine = Engine::new(
//!     EngineConfig::default(),
//!     Arc::new(directory),
//!     Arc::new(StaticCities::major_cities()),
//! );
//! let mut submission = NewTransaction {
//!     title: "Tuition".into(),
//!     description: "Spring semester".into(),
//!     amount: Decimal::from(100),
//!     currency: "USD".into(),
//!     from_city: "Paris".into(),
//!     to_city: "Tokyo".into(),
//!     recipient_name: "Kenji".into(),
//!     recipient_details: "Account 1".into(),
//! };
//! let x = engine.post_transaction(alice, &submission).unwrap();
//! submission.from_city = "Tokyo".into();
//! submission.to_city = "Paris".into();
//! let y = engine.post_transaction(bob, &submission).unwrap();
//!
//! let candidates = engine.find_candidates(x.id).unwrap();
//! assert_eq!(candidates[0].id, y.id);
//! let pairing = engine.create_match(x.id, y.id, alice).unwrap();
//! assert_eq!(pairing.counterpart.status, TransactionStatus::Matched);
//! assert!(engine.can_message(y.id, alice));
//! ```
//!
//! ## Lower-level API
//!
//! [`TransactionStore`], [`find_candidates`], and the functions in [`matching`] can be
//! used directly when you manage authorization and auditing yourself.

pub mod api;
pub mod approval;
pub mod audit;
pub mod auth;
pub mod candidates;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod matching;
pub mod persistence;
pub mod ratings;
pub mod registry;
pub mod store;
pub mod types;

pub use candidates::{find_candidates, is_compatible};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use generator::{replay_into_engine, Generator, GeneratorConfig};
pub use lifecycle::LifecycleEvent;
pub use matching::{Pairing, RejectDisposition};
pub use store::{ListFilter, TransactionStore};
pub use types::{ChatMessage, Currency, MessageId, NewTransaction, PairingKey, Rating, Transaction, TransactionId, TransactionStatus, UserId};
