//! Front-end pipeline benchmarks: tokenize, parse, link and full compile
//! over a generated multi-module application

use std::hint::black_box;

use appspec_core::{compile, link, parse_module, parse_source, tokenize, CompileOptions, SourceFile};
use criterion::{criterion_group, criterion_main, Criterion};

fn module_source(index: usize, entities: usize) -> String {
    let mut text = format!("module m{}\n", index);
    if index > 0 {
        text.push_str(&format!("use m{}\n", index - 1));
    }
    for e in 0..entities {
        text.push_str(&format!(
            "entity E{i}_{e}:\n  id: uuid pk\n  name: str(80) required\n  total: decimal(10,2) = 0\n  status: enum[open,closed]=open\n  invariant: total >= 0\n",
            i = index,
            e = e
        ));
        if index > 0 {
            text.push_str(&format!("  parent: ref E{}_{}\n", index - 1, e));
        }
        text.push_str(&format!(
            "surface e{i}_{e}_list:\n  uses entity E{i}_{e}\n  field name\n  field status\n",
            i = index,
            e = e
        ));
    }
    text
}

fn files() -> Vec<SourceFile> {
    (0..8)
        .map(|i| SourceFile::new(format!("m{}.dsl", i), module_source(i, 25)))
        .collect()
}

fn benchmark_front_end(c: &mut Criterion) {
    let files = files();
    let text = files[3].text.clone();

    c.bench_function("tokenize_module", |b| {
        b.iter(|| black_box(tokenize(black_box(&text))));
    });

    let (tokens, _) = tokenize(&text);
    c.bench_function("parse_module", |b| {
        b.iter(|| black_box(parse_module(black_box(&tokens))));
    });

    let options = CompileOptions::default();
    let modules: Vec<_> = files.iter().map(|f| parse_source(f, &options).0).collect();
    c.bench_function("link_application", |b| {
        b.iter(|| black_box(link(modules.clone())));
    });
}

fn benchmark_compile(c: &mut Criterion) {
    let files = files();
    let sequential = CompileOptions {
        parallel: false,
        ..CompileOptions::default()
    };
    let parallel = CompileOptions::default();

    c.bench_function("compile_sequential", |b| {
        b.iter(|| black_box(compile(black_box(&files), &sequential)));
    });

    c.bench_function("compile_parallel", |b| {
        b.iter(|| black_box(compile(black_box(&files), &parallel)));
    });
}

criterion_group!(benches, benchmark_front_end, benchmark_compile);
criterion_main!(benches);
