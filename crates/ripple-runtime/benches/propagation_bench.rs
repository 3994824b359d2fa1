//! Benchmarks for change propagation and batch flushing.
//!
//! Run with: `cargo bench --package ripple-runtime --bench propagation_bench`
//!
//! # Performance Baselines
//!
//! These benchmarks establish baselines for:
//! - Bus dispatch to many listeners
//! - A leaf write climbing a deep object chain
//! - Array mutations with owned elements
//! - Flushing a batch with heavy deduplication

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ripple_core::change::SET;
use ripple_core::{Change, ChangeBus, Value};
use ripple_runtime::{Batcher, Graph, Job, Observer};
use std::hint::black_box;

// ============================================================================
// Fixtures
// ============================================================================

/// Object chain `k0.k1...k{depth-1}.leaf` observed from the root.
fn deep_chain(graph: &Graph, depth: usize) -> (Value, Value, Observer) {
    let leaf = graph.new_object([("leaf", 0)]);
    let mut current = leaf.clone();
    for level in (0..depth).rev() {
        current = graph.new_object([(format!("k{level}"), current)]);
    }
    let observer = Observer::new();
    graph.observe(&current, "", &observer);
    (current, leaf, observer)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_bus_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_dispatch");
    for listeners in [1usize, 8, 64] {
        let bus = ChangeBus::new();
        for _ in 0..listeners {
            bus.on_fn(SET, |_, args| {
                black_box(args);
            });
        }
        let change = [Change::set("a", 1, false)];
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| bus.emit(SET, black_box(&change)));
        });
    }
    group.finish();
}

fn bench_deep_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_write");
    for depth in [1usize, 4, 16] {
        let graph = Graph::new();
        let (_root, leaf, observer) = deep_chain(&graph, depth);
        observer.on(SET, |change| {
            black_box(change);
        });
        let obj = graph.object(leaf.as_node().expect("leaf node")).expect("leaf object");
        let mut n = 0;
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                n += 1;
                obj.set("leaf", n);
            });
        });
    }
    group.finish();
}

fn bench_array_push_pop(c: &mut Criterion) {
    let graph = Graph::new();
    let items: Vec<Value> = (0..32).map(|i| graph.new_object([("i", i)])).collect();
    let list = graph.new_array(items.clone());
    graph.observe(&list, "", &Observer::new());
    let view = graph.array(list.as_node().expect("list node")).expect("list array");

    c.bench_function("array_push_pop_owned", |b| {
        b.iter(|| {
            view.push([items[0].clone()]);
            black_box(view.pop());
        });
    });
}

fn bench_batch_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_flush");
    for jobs in [100usize, 1_000] {
        group.throughput(Throughput::Elements(jobs as u64));
        group.bench_with_input(BenchmarkId::new("dedup_16", jobs), &jobs, |b, &jobs| {
            let batcher: Batcher = Batcher::new();
            b.iter(|| {
                for i in 0..jobs {
                    batcher.push(Job::new(|| {}).with_id((i % 16) as u64));
                }
                batcher.tick().run();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_bus_dispatch,
    bench_deep_write,
    bench_array_push_pop,
    bench_batch_flush
);
criterion_main!(benches);
