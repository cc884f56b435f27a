use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nbhist_history::{History, RunKind};
use nbhist_parser::parse;

fn cell_source(lines: usize, changed: Option<usize>) -> String {
    (0..lines)
        .map(|i| {
            let value = if Some(i) == changed { i + 1000 } else { i };
            format!("v{i} = f(v{}, {value}) * 2", i.saturating_sub(1))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_repair_and_commit(c: &mut Criterion) {
    let original = cell_source(200, None);
    let edited = cell_source(200, Some(150));
    let tree = parse(&original).unwrap();

    c.bench_function("repair_commit_one_line", |b| {
        b.iter_batched(
            || {
                let mut history = History::new();
                let cell = history.insert_code_cell(0, &tree, None).unwrap();
                (history, cell)
            },
            |(mut history, cell)| {
                let pending = history.begin_code_repair(cell, &edited).unwrap().unwrap();
                history
                    .complete_code_repair(&pending, parse(&pending.text))
                    .unwrap();
                let run = history.begin_run(RunKind::Execute);
                black_box(history.commit(cell, run, None).unwrap())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_render(c: &mut Criterion) {
    let source = cell_source(200, None);
    let mut history = History::new();
    let cell = history
        .insert_code_cell(0, &parse(&source).unwrap(), None)
        .unwrap();

    c.bench_function("render_cell", |b| {
        b.iter(|| black_box(history.render(&cell.at(0)).unwrap()))
    });
}

criterion_group!(benches, bench_repair_and_commit, bench_render);
criterion_main!(benches);
