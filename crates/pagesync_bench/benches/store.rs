//! Store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pagesync_bench::generate_document;
use pagesync_store::{
    now_millis, EntityType, LogOperation, LogQuery, NewEntity, Store, SyncUpdate, WalOperation,
};
use serde_json::json;
use tempfile::TempDir;

/// Benchmark content-addressed blob upserts, new and deduplicated.
fn bench_upsert_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert_content");

    for lines in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("new", lines), lines, |b, &lines| {
            let store = Store::in_memory().unwrap();
            let doc = generate_document(lines);
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let id = store.upsert_content(&format!("{doc}\n\n{n}")).unwrap();
                black_box(id);
            });
        });
        group.bench_with_input(BenchmarkId::new("duplicate", lines), lines, |b, &lines| {
            let store = Store::in_memory().unwrap();
            let doc = generate_document(lines);
            store.upsert_content(&doc).unwrap();
            b.iter(|| black_box(store.upsert_content(black_box(&doc)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark a full WAL cycle against a file-backed store.
fn bench_wal_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("wal_cycle");
    group.sample_size(20);

    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("sync.db")).unwrap();
    let doc = store
        .upsert_entity(&NewEntity::new("/p/doc.md", "page-1", EntityType::Doc))
        .unwrap();
    let body = generate_document(50);

    group.bench_function("push", |b| {
        b.iter(|| {
            let wal = store
                .wal_begin(doc.id, WalOperation::Push, None, &body)
                .unwrap();
            store.wal_mark_target_written(wal).unwrap();
            let blob = store.upsert_content(&body).unwrap();
            let update = SyncUpdate {
                local_hash: "h".into(),
                remote_hash: "h".into(),
                remote_version: None,
                base_content_id: blob,
                synced_at: now_millis(),
            };
            store.wal_commit_sync(wal, doc.id, &update).unwrap();
            store.wal_delete(wal).unwrap();
        });
    });

    group.finish();
}

/// Benchmark sync log queries over a populated log.
fn bench_log_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_query");
    let store = Store::in_memory().unwrap();
    let doc = store
        .upsert_entity(&NewEntity::new("/p/doc.md", "page-1", EntityType::Doc))
        .unwrap();
    for i in 0..5_000 {
        let op = if i % 10 == 0 {
            LogOperation::Error
        } else {
            LogOperation::Push
        };
        store
            .append_log(Some(doc.id), op, None, &json!({ "n": i }))
            .unwrap();
    }

    group.bench_function("recent", |b| {
        let query = LogQuery::default();
        b.iter(|| black_box(store.query_log(black_box(&query)).unwrap()));
    });
    group.bench_function("entity", |b| {
        let query = LogQuery::default().with_entity(doc.id).with_limit(20);
        b.iter(|| black_box(store.query_log(black_box(&query)).unwrap()));
    });
    group.bench_function("errors", |b| {
        let query = LogQuery::default().with_operation(LogOperation::Error);
        b.iter(|| black_box(store.query_log(black_box(&query)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_upsert_content, bench_wal_cycle, bench_log_query);
criterion_main!(benches);
