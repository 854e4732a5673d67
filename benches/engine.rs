//! Engine performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use offset_exchange::registry::{InMemoryDirectory, Role, StaticCities};
use offset_exchange::{replay_into_engine, Engine, EngineConfig, Generator, GeneratorConfig};
use std::sync::Arc;

const USERS: u64 = 20;

fn engine() -> Engine {
    let directory = InMemoryDirectory::new();
    for i in 0..USERS {
        directory.register(&format!("user{}", i), Role::User).unwrap();
    }
    Engine::new(
        EngineConfig::default(),
        Arc::new(directory),
        Arc::new(StaticCities::major_cities()),
    )
}

fn postings(n: usize) -> GeneratorConfig {
    GeneratorConfig {
        seed: 42,
        num_postings: n,
        num_users: USERS,
        ..Default::default()
    }
}

fn bench_post_throughput(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("post_transaction_1000", |b| {
        b.iter_batched(
            || (engine(), Generator::new(postings(N)).all_postings()),
            |(engine, stream)| {
                replay_into_engine(&engine, stream).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_find_candidates(c: &mut Criterion) {
    let engine = engine();
    let posted = replay_into_engine(&engine, Generator::new(postings(2000)).all_postings()).unwrap();
    let target = posted[0].id;
    c.bench_function("find_candidates_2000_open", |b| {
        b.iter(|| engine.find_candidates(target).unwrap())
    });
}

fn bench_create_match(c: &mut Criterion) {
    c.bench_function("create_match_after_500", |b| {
        b.iter_batched(
            || {
                let engine = engine();
                let posted = replay_into_engine(&engine, Generator::new(postings(500)).all_postings()).unwrap();
                let pair = posted.iter().find_map(|t| {
                    engine
                        .find_candidates(t.id)
                        .unwrap()
                        .first()
                        .map(|c| (t.id, c.id, t.owner))
                });
                (engine, pair)
            },
            |(engine, pair)| {
                if let Some((own, other, owner)) = pair {
                    engine.create_match(own, other, owner).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_post_throughput, bench_find_candidates, bench_create_match);
criterion_main!(benches);
