//! Three-way merge benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pagesync_bench::{edit_lines, generate_document};
use pagesync_protocol::{three_way_merge, ConflictStrategy};

/// Disjoint edits on both sides: merges cleanly.
fn bench_clean_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_clean");

    for lines in [10, 100, 1000].iter() {
        let base = generate_document(*lines);
        let local = edit_lines(&base, 0, 8, "local");
        let remote = edit_lines(&base, 4, 8, "remote");

        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, _| {
            b.iter(|| {
                let outcome = three_way_merge(
                    black_box(&base),
                    black_box(&local),
                    black_box(&remote),
                    ConflictStrategy::ThreeWayMerge,
                );
                black_box(outcome);
            });
        });
    }

    group.finish();
}

/// Same lines edited on both sides under each auto-resolving strategy.
fn bench_conflicting_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_conflicting");
    let base = generate_document(200);
    let local = edit_lines(&base, 0, 4, "local");
    let remote = edit_lines(&base, 0, 4, "remote");

    for strategy in [
        ConflictStrategy::ThreeWayMerge,
        ConflictStrategy::LocalWins,
        ConflictStrategy::RemoteWins,
    ] {
        group.bench_function(strategy.as_str(), |b| {
            b.iter(|| {
                let outcome =
                    three_way_merge(black_box(&base), black_box(&local), black_box(&remote), strategy);
                black_box(outcome);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_clean_merge, bench_conflicting_merge);
criterion_main!(benches);
