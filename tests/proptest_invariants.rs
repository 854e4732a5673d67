//! Property-based and deterministic invariant tests.
//!
//! Uses proptest to generate (seed, num_postings); replays synthetic postings into the
//! engine, greedily matches every open transaction with its best candidate, and asserts:
//! candidates satisfy the compatibility predicate, pairings are symmetric, no transaction
//! is paired twice. Deterministic replay: same config ⇒ same outcome.

use offset_exchange::registry::{InMemoryDirectory, Role, StaticCities};
use offset_exchange::{
    is_compatible, replay_into_engine, Engine, EngineConfig, Generator, GeneratorConfig, Transaction,
    TransactionId, TransactionStatus,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const USERS: u64 = 5;

fn engine() -> Engine {
    let directory = InMemoryDirectory::new();
    for i in 0..USERS {
        directory.register(&format!("user{}", i), Role::User).unwrap();
    }
    Engine::new(
        EngineConfig {
            list_limit: usize::MAX,
            ..Default::default()
        },
        Arc::new(directory),
        Arc::new(StaticCities::major_cities()),
    )
}

/// Replays the stream, then pairs each still-active posting with its first candidate.
fn replay_and_match(seed: u64, num_postings: usize) -> Engine {
    let engine = engine();
    let config = GeneratorConfig {
        seed,
        num_postings,
        num_users: USERS,
        ..Default::default()
    };
    let posted = replay_into_engine(&engine, Generator::new(config).all_postings()).unwrap();
    for t in &posted {
        let current = engine.transaction(t.id).unwrap();
        if !current.is_active() {
            continue;
        }
        let candidates = engine.find_candidates(t.id).unwrap();
        assert_candidates_compatible(&current, &candidates);
        if let Some(best) = candidates.first() {
            engine.create_match(t.id, best.id, current.owner).unwrap();
        }
    }
    engine
}

/// Invariant: every candidate is active, compatible, and ordered by amount distance.
fn assert_candidates_compatible(target: &Transaction, candidates: &[Transaction]) {
    for c in candidates {
        assert!(c.is_active(), "candidate {:?} must be active", c.id);
        assert!(is_compatible(target, c), "candidate {:?} incompatible with {:?}", c.id, target.id);
    }
    let distances: Vec<_> = candidates.iter().map(|c| (c.amount - target.amount).abs()).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]), "candidates out of order");
}

/// Invariant: pairings are mutual and each transaction appears in at most one.
fn assert_symmetric_pairings(all: &[Transaction]) {
    let mut seen: HashSet<TransactionId> = HashSet::new();
    for t in all {
        match t.counterpart {
            Some(cp) => {
                assert_eq!(t.status, TransactionStatus::Matched);
                let other = all.iter().find(|o| o.id == cp).expect("counterpart exists");
                assert_eq!(other.counterpart, Some(t.id), "pairing {:?}<->{:?} not mutual", t.id, cp);
                assert!(is_compatible(t, other));
                assert!(seen.insert(t.id), "{:?} paired twice", t.id);
            }
            None => assert_eq!(t.status, TransactionStatus::Active),
        }
    }
}

/// After greedy matching no two active transactions are still compatible.
fn assert_no_missed_pairs(all: &[Transaction]) {
    let active: Vec<_> = all.iter().filter(|t| t.is_active()).collect();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            assert!(!is_compatible(a, b), "{:?} and {:?} left unmatched", a.id, b.id);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn matching_invariants_hold(seed in 0u64..10_000, num_postings in 1usize..120) {
        let engine = replay_and_match(seed, num_postings);
        let all = engine.list_transactions(&Default::default());
        prop_assert_eq!(all.len(), num_postings);
        assert_symmetric_pairings(&all);
        assert_no_missed_pairs(&all);
    }

    #[test]
    fn active_candidates_are_compatible(seed in 0u64..10_000, num_postings in 1usize..80) {
        let engine = engine();
        let config = GeneratorConfig { seed, num_postings, num_users: USERS, ..Default::default() };
        replay_into_engine(&engine, Generator::new(config).all_postings()).unwrap();
        for t in engine.list_active() {
            let candidates = engine.find_candidates(t.id).unwrap();
            assert_candidates_compatible(&t, &candidates);
        }
    }
}

#[test]
fn deterministic_replay_same_outcome() {
    let pairs = |engine: &Engine| -> Vec<(TransactionId, Option<TransactionId>)> {
        let mut v: Vec<_> = engine
            .list_transactions(&Default::default())
            .into_iter()
            .map(|t| (t.id, t.counterpart))
            .collect();
        v.sort();
        v
    };
    let a = replay_and_match(7, 60);
    let b = replay_and_match(7, 60);
    assert_eq!(pairs(&a), pairs(&b));
}
