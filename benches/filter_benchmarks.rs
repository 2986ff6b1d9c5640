//! Filter parsing and compilation benchmarks
//!
//! Run with: cargo bench --bench filter_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use screening_db::query::{compile, parse_filter, Comparator, Connective, Field, Filter, FilterRow};

const FILTERS: [(&str, &str); 4] = [
    ("single", "Cpd.name = 'CompoundX'"),
    ("conjunction", "Cpd.group = 'kinase' AND Usr.usr_name != 'carol'"),
    ("list", "Cpd.name IN ('A1', 'A2', 'A3', 'A4', 'A5', 'A6', 'A7', 'A8')"),
    (
        "nested",
        "(Cpd.name LIKE 'Comp%' OR Cpd.cas = '50-00-0') AND (Rtn.alias = 'assay1' OR Rtn.author = 'alice')",
    ),
];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_parse");
    for (name, text) in FILTERS {
        group.bench_with_input(BenchmarkId::new("parse_filter", name), text, |b, text| {
            b.iter(|| parse_filter(black_box(text)).unwrap());
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_compile");
    for (name, text) in FILTERS {
        let filter = parse_filter(text).unwrap();
        group.bench_with_input(BenchmarkId::new("compile", name), &filter, |b, filter| {
            b.iter(|| compile(black_box(filter)).unwrap());
        });
    }
    group.finish();
}

fn bench_rows(c: &mut Criterion) {
    let rows: Vec<FilterRow> = (0..16)
        .map(|i| {
            let row = FilterRow::new(Field::CompoundName, Comparator::Eq, format!("Compound{i}"));
            if i % 4 == 0 {
                row.connective(Connective::Or)
            } else {
                row
            }
        })
        .collect();
    c.bench_function("filter_from_rows_16", |b| {
        b.iter(|| Filter::from_rows(black_box(&rows)).unwrap());
    });
}

criterion_group!(benches, bench_parse, bench_compile, bench_rows);
criterion_main!(benches);
