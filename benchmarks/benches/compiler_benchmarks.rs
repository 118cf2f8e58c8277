//! Benchmarks for the Callisto compiler
//!
//! Measures performance of:
//! - Lexer throughput
//! - Parser throughput
//! - Full lowering pipeline to Uxntal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lang::codegen::uxn::UxnBackend;
use lang::codegen::Compiler;
use lang::lexer::lex;
use lang::parser::parse;

/// A run of bare pushes
const PUSHES: &str = "1 2 3 4 5 6 7 8 9 10";

/// Locals, parameters and assignments
const LOCALS: &str = r#"
func shuffle u16 a u16 b begin
    let u16 t
    a -> t
    b t
end
"#;

/// Branches and loops
const CONTROL: &str = r#"
func classify u16 n begin
    if n then 1 elseif n then 2 else 3 end
    while n do break end
end
"#;

/// Type definitions and their constants
const TYPES: &str = r#"
struct Point u16 x u16 y end
struct Rect : Point u16 w u16 h end
enum Color : u8 Red Green Blue end
func origin begin
    let Rect r
    &r Rect.sizeof Color.max
end
"#;

/// Array realisation and the copy loop
const ARRAYS: &str = r#"
func table begin
    [ u8 1 2 3 4 5 6 7 8 ]
    [c u16 256 512 1024]
end
table
"#;

const TEST_CASES: [(&str, &str); 5] = [
    ("pushes", PUSHES),
    ("locals", LOCALS),
    ("control", CONTROL),
    ("types", TYPES),
    ("arrays", ARRAYS),
];

fn bench_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");
    for (name, source) in TEST_CASES {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| lex(black_box(source), "bench.cal").unwrap());
        });
    }
    group.finish();
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    for (name, source) in TEST_CASES {
        let tokens = lex(source, "bench.cal").unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &tokens, |b, tokens| {
            b.iter(|| parse(black_box(tokens.clone())).unwrap());
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    for (name, source) in TEST_CASES {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let tokens = lex(black_box(source), "bench.cal").unwrap();
                let nodes = parse(tokens).unwrap();
                let mut compiler = Compiler::new(Box::new(UxnBackend::new()));
                compiler.compile(nodes).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lexer, bench_parser, bench_pipeline);
criterion_main!(benches);
