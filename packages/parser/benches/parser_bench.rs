use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nbhist_parser::parse;

fn parse_small_cell(c: &mut Criterion) {
    let source = "x = 1\ny = x + 2\nprint(x, y)";

    c.bench_function("parse_small_cell", |b| b.iter(|| parse(black_box(source))));
}

fn parse_large_cell(c: &mut Criterion) {
    let source: String = (0..200)
        .map(|i| format!("v{i} = (v{i} + {i}) * scale(v{i}, -{i})  # step {i}\n"))
        .collect();

    c.bench_function("parse_large_cell", |b| b.iter(|| parse(black_box(&source))));
}

criterion_group!(benches, parse_small_cell, parse_large_cell);
criterion_main!(benches);
