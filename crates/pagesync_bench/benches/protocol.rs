//! Normalization, hashing and block translation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pagesync_bench::{add_noise, generate_document};
use pagesync_protocol::{blocks_to_markdown, content_hash, markdown_to_blocks, normalize};

/// Benchmark normalizing noisy documents.
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for lines in [10, 100, 1000].iter() {
        let text = add_noise(&generate_document(*lines));
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &text, |b, text| {
            b.iter(|| black_box(normalize(black_box(text))));
        });
    }

    group.finish();
}

/// Benchmark content hashing.
fn bench_content_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_hash");

    for lines in [10, 100, 1000].iter() {
        let text = generate_document(*lines);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &text, |b, text| {
            b.iter(|| black_box(content_hash(black_box(text))));
        });
    }

    group.finish();
}

/// Benchmark markdown to block conversion and back.
fn bench_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocks");

    for lines in [10, 100, 1000].iter() {
        let text = generate_document(*lines);
        let blocks = markdown_to_blocks(&text);

        group.bench_with_input(BenchmarkId::new("to_blocks", lines), &text, |b, text| {
            b.iter(|| black_box(markdown_to_blocks(black_box(text))));
        });
        group.bench_with_input(BenchmarkId::new("to_markdown", lines), &blocks, |b, blocks| {
            b.iter(|| black_box(blocks_to_markdown(black_box(blocks))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_content_hash, bench_blocks);
criterion_main!(benches);
