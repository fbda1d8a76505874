//! Path resolution cost on the anchor registry.
//!
//! `alloc` resolves a path nobody holds, so every segment is created and
//! pruned again on release. `exists` resolves a path that is already pinned,
//! which only touches counters under read locks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ww_cluster::PathRegistry;

const SEGMENTS: &[&str] = &["alpha", "bravo", "charlie", "delta", "echo", "fox"];

fn bench_tree_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_walk");

    for depth in 1..=SEGMENTS.len() {
        let path = &SEGMENTS[..depth];

        group.bench_with_input(BenchmarkId::new("alloc", depth), path, |b, path| {
            let registry = PathRegistry::new();
            b.iter(|| registry.resolve(black_box(path)).release());
        });

        group.bench_with_input(BenchmarkId::new("exists", depth), path, |b, path| {
            let registry = PathRegistry::new();
            let _pinned = registry.resolve(path);
            b.iter(|| registry.resolve(black_box(path)).release());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tree_walk);
criterion_main!(benches);
