//! Performance benchmarks for the message broker.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use msgbus::{Broker, MessageType, Owner, Selector};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Tick(u64);

/// Benchmark publish fan-out to N matching subscribers
fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");

    for subscribers in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let broker = Broker::new();
                let sum = Arc::new(AtomicU64::new(0));

                for _ in 0..count {
                    let sum = Arc::clone(&sum);
                    broker.subscribe_topic(Owner::anonymous(), "tick", move |t: &Tick| {
                        sum.fetch_add(t.0, Ordering::Relaxed);
                    });
                }

                b.iter(|| {
                    broker.publish_object_to("tick", black_box(&Tick(1))).unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark publish when only a few of many subscriptions match
fn bench_publish_selective(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_selective");

    for registered in [100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("registered", registered),
            &registered,
            |b, &count| {
                let broker = Broker::new();
                for i in 0..count {
                    broker.subscribe_signal(Owner::anonymous(), &format!("topic.{i}"), || ());
                }

                b.iter(|| {
                    broker.publish(black_box("topic.7")).unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark pattern subscriptions against exact names
fn bench_pattern_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_matching");

    group.bench_function("exact", |b| {
        let broker = Broker::new();
        for _ in 0..100 {
            broker.subscribe_signal(Owner::anonymous(), "orders.created", || ());
        }
        b.iter(|| broker.publish(black_box("orders.created")).unwrap());
    });

    group.bench_function("pattern", |b| {
        let broker = Broker::new();
        for _ in 0..100 {
            broker
                .subscribe_signal_pattern(Owner::anonymous(), r"^orders\.(created|updated)$", || ())
                .unwrap();
        }
        b.iter(|| broker.publish(black_box("orders.created")).unwrap());
    });

    group.finish();
}

/// Benchmark delivery through a declared supertype
fn bench_subtype_dispatch(c: &mut Criterion) {
    let broker = Broker::new();
    let base = MessageType::of::<u64>();
    broker.register_type(
        MessageType::derived::<Tick>()
            .extends(&base, |t: &Tick| &t.0)
            .build(),
    );

    let sum = Arc::new(AtomicU64::new(0));
    let total = Arc::clone(&sum);
    broker.subscribe_type(Owner::anonymous(), move |n: &u64| {
        total.fetch_add(*n, Ordering::Relaxed);
    });

    c.bench_function("subtype_dispatch", |b| {
        b.iter(|| broker.publish_object(black_box(&Tick(3))).unwrap());
    });
}

/// Benchmark subscribe followed by unsubscribe
fn bench_subscribe_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscribe_cycle");

    group.bench_function("handle", |b| {
        let broker = Broker::new();
        b.iter(|| {
            let handle = broker.subscribe_signal(Owner::anonymous(), "t", || ());
            black_box(broker.unsubscribe(&handle));
        });
    });

    group.bench_function("owner", |b| {
        let broker = Broker::new();
        let owner = Arc::new(());
        b.iter(|| {
            for topic in ["a", "b", "c"] {
                broker.subscribe_signal(&owner, topic, || ());
            }
            black_box(broker.unsubscribe_where(&Selector::owner(&owner)));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_publish_selective,
    bench_pattern_matching,
    bench_subtype_dispatch,
    bench_subscribe_cycle,
);

criterion_main!(benches);
