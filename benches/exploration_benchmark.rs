//! Exploration benchmark suite for Lockstep.
//!
//! Benchmarks the cost of exploring schedules end to end:
//! - Strategies: one small racy program under each strategy
//! - Actors: event throughput between two machines
//! - Liveness: per-step overhead of cycle detection
//! - Traces: JSON encoding of a recorded schedule
//!
//! Every measured iteration spawns real operation threads, so absolute
//! numbers are dominated by thread hand-off latency.

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lockstep::sync::Mutex;
use lockstep::trace::file::{from_json, to_json};
use lockstep::{
    Choice, OperationId, Runtime, ScheduleTrace, StateMachineBuilder, StrategyKind, TestConfig,
    TestEngine,
};
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

#[derive(Debug)]
struct Ping;

/// Two tasks, one shared mutex, no bug.
fn guarded_counter(runtime: &Runtime) {
    let counter = Arc::new(Mutex::new(0_u32));
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let counter = Arc::clone(&counter);
            runtime.spawn(move || *counter.lock() += 1)
        })
        .collect();
    for task in tasks {
        task.join();
    }
    runtime.assert(*counter.lock() == 2, "lost update");
}

fn explore<F>(config: TestConfig, test: F) -> u64
where
    F: Fn(&Runtime) + Send + Sync + 'static,
{
    let mut engine = TestEngine::new(config).expect("valid config");
    let report = engine.run(test);
    assert!(report.is_success(), "{report}");
    report.iterations
}

// =============================================================================
// STRATEGY BENCHMARKS
// =============================================================================

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("exploration/strategies");
    group.sample_size(10);
    let iterations = 20;
    group.throughput(Throughput::Elements(iterations));

    for kind in [
        StrategyKind::Dfs,
        StrategyKind::Random,
        StrategyKind::Priority,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
            b.iter(|| {
                let config = TestConfig::new(kind).iterations(iterations).max_steps(200);
                black_box(explore(config, guarded_counter))
            })
        });
    }

    group.finish();
}

// =============================================================================
// ACTOR BENCHMARKS
// =============================================================================

fn bench_actor_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("exploration/actors");
    group.sample_size(10);

    let sink = StateMachineBuilder::<u64>::new("Sink")
        .state("Init", |s| s.start().on_event_do::<Ping, _>(|count, _| *count += 1))
        .build()
        .expect("valid machine");

    for events in [10_u64, 100] {
        group.throughput(Throughput::Elements(events));
        let sink = Arc::clone(&sink);
        group.bench_with_input(BenchmarkId::new("send", events), &events, move |b, &events| {
            b.iter(|| {
                let sink = Arc::clone(&sink);
                let config = TestConfig::new(StrategyKind::Random)
                    .iterations(1)
                    .max_steps(10_000);
                black_box(explore(config, move |runtime| {
                    let actor = runtime.create_machine(&sink, 0);
                    for _ in 0..events {
                        runtime.send_event(actor, Ping);
                    }
                }))
            })
        });
    }

    group.finish();
}

// =============================================================================
// LIVENESS BENCHMARKS
// =============================================================================

fn bench_cycle_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("exploration/liveness");
    group.sample_size(10);

    for enabled in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("cycle_detection", enabled),
            &enabled,
            |b, &enabled| {
                b.iter(|| {
                    let config = TestConfig::new(StrategyKind::Random)
                        .iterations(5)
                        .max_steps(500)
                        .cycle_detection(enabled);
                    black_box(explore(config, |runtime| {
                        for _ in 0..50 {
                            runtime.interleave();
                        }
                    }))
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// TRACE BENCHMARKS
// =============================================================================

fn bench_trace_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("exploration/trace_json");

    for len in [100_usize, 10_000] {
        let mut trace = ScheduleTrace::new();
        for i in 0..len {
            let choice = match i % 3 {
                0 => Choice::Operation(OperationId::new(i as u64 % 4)),
                1 => Choice::Boolean(i % 2 == 0),
                _ => Choice::Integer(i as u64),
            };
            trace.push(choice);
        }
        let json = to_json(&trace).expect("encode");
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("encode", len), &trace, |b, trace| {
            b.iter(|| black_box(to_json(trace).expect("encode")))
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &json, |b, json| {
            b.iter(|| black_box(from_json(json).expect("decode")))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_strategies,
    bench_actor_events,
    bench_cycle_detection,
    bench_trace_json,
);
criterion_main!(benches);
