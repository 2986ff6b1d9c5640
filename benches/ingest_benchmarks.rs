//! Ingestion benchmarks
//!
//! Measures the per-row cost of the savepoint pipeline (entity resolution,
//! results row, routine row) and of reading rows back through a filter.
//!
//! Run with: cargo bench --bench ingest_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use screening_db::entity::RoutineRecord;
use screening_db::ingest::Row;
use screening_db::schema::{FieldType, FieldTypes};
use screening_db::Database;
use tempfile::TempDir;

const SMALL_SIZE: usize = 100;
const MEDIUM_SIZE: usize = 1_000;
const LARGE_SIZE: usize = 10_000;

/// Fresh database with `assay1 {od600: float, well: string}`
fn setup(root: &TempDir) -> Database {
    let mut db = Database::in_memory()
        .unwrap()
        .with_workspace_root(root.path());
    db.initialize_schema().unwrap();
    let fields = FieldTypes::new()
        .with("od600", FieldType::Float)
        .with("well", FieldType::String);
    db.define_routine(&RoutineRecord::builder("assay1", fields).author("alice").build(), None)
        .unwrap();
    db
}

/// One plate of rows over `compounds` distinct samples
fn plate(rows: usize, compounds: usize) -> Vec<Row> {
    (0..rows)
        .map(|i| {
            Row::new()
                .with("sample", format!("Compound{}", i % compounds))
                .with("od600", i as f64 * 0.001)
                .with("well", format!("{}{:02}", (b'A' + (i % 8) as u8) as char, i % 12 + 1))
        })
        .collect()
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_rows");
    let common = Row::new().with("user", "alice").with("date", 43831);

    for size in [SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let rows = plate(size, 96);
        group.bench_with_input(BenchmarkId::new("savepoint_per_row", size), &rows, |b, rows| {
            b.iter_batched(
                || {
                    let root = tempfile::tempdir().unwrap();
                    let db = setup(&root);
                    (root, db)
                },
                |(_root, mut db)| {
                    black_box(db.ingest("assay1", rows, &common).unwrap());
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_routine_rows");

    for size in [SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let root = tempfile::tempdir().unwrap();
        let mut db = setup(&root);
        let common = Row::new().with("user", "alice");
        db.ingest("assay1", &plate(size, 96), &common).unwrap();

        group.bench_with_input(BenchmarkId::new("single_compound", size), &size, |b, _| {
            b.iter(|| black_box(db.query_text("Cpd.name = 'Compound7'").unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("all_by_user", size), &size, |b, _| {
            b.iter(|| black_box(db.query_text("Usr.usr_name = 'alice'").unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingest, bench_query);
criterion_main!(benches);
