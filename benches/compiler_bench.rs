use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stc::expr::Expr;
use stc::ir::{LoopKind, Nest, Program, Stmt};
use stc::schedule::{
    AffineTransform, GatherDirective, ScatterBufferDirective, Schedule, Strategy,
};

// KPI-aligned benchmark scenarios: the space-time transform on a wavefront
// recurrence, plus each data-path synthesizer on its canonical consumer.

/// C[i, j] = C[i - 1, j] + A[i, j] over [0, n) x [0, n).
fn wavefront_nest(n: i64) -> Nest {
    Nest {
        name: "C".into(),
        body: Stmt::loop_(
            "i",
            Expr::int(0),
            Expr::int(n),
            LoopKind::Serial,
            Stmt::loop_(
                "j",
                Expr::int(0),
                Expr::int(n),
                LoopKind::Serial,
                Stmt::write(
                    "C",
                    vec![Expr::var("i"), Expr::var("j")],
                    Expr::read("C", vec![Expr::var("i") - Expr::int(1), Expr::var("j")])
                        + Expr::read("A", vec![Expr::var("i"), Expr::var("j")]),
                ),
            ),
        ),
    }
}

fn wavefront_transform() -> AffineTransform {
    AffineTransform::new(vec!["j", "i"], vec!["s", "t"], vec![vec![1, 0]], vec![1, 1])
}

/// Feeder forwarding one producer element per (k, ii) iteration.
fn feeder_nest(n: i64) -> Nest {
    Nest {
        name: "A_feeder".into(),
        body: Stmt::loop_(
            "k",
            Expr::int(0),
            Expr::int(n),
            LoopKind::Serial,
            Stmt::loop_(
                "ii",
                Expr::int(0),
                Expr::int(n),
                LoopKind::Unrolled,
                Stmt::write(
                    "A_feeder",
                    vec![Expr::var("k"), Expr::var("ii")],
                    Expr::read("A", vec![Expr::var("k"), Expr::var("ii")]),
                ),
            ),
        ),
    }
}

/// Loader whose producer stream skips the innermost consumer loop.
fn loader_nest(n: i64) -> Nest {
    Nest {
        name: "B_loader".into(),
        body: Stmt::loop_(
            "j",
            Expr::int(0),
            Expr::int(n),
            LoopKind::Serial,
            Stmt::loop_(
                "k",
                Expr::int(0),
                Expr::int(n),
                LoopKind::Serial,
                Stmt::loop_(
                    "jj",
                    Expr::int(0),
                    Expr::int(n),
                    LoopKind::Serial,
                    Stmt::write(
                        "B_loader",
                        vec![Expr::var("j"), Expr::var("k"), Expr::var("jj")],
                        Expr::read("B", vec![Expr::var("j"), Expr::var("k")]),
                    ),
                ),
            ),
        ),
    }
}

fn drainer_nest(n: i64) -> Nest {
    Nest {
        name: "C_drain".into(),
        body: Stmt::loop_(
            "k",
            Expr::int(0),
            Expr::int(n),
            LoopKind::Serial,
            Stmt::loop_(
                "ii",
                Expr::int(0),
                Expr::int(n),
                LoopKind::Unrolled,
                Stmt::write(
                    "C_drain",
                    vec![Expr::var("k"), Expr::var("ii")],
                    Expr::read("Cout", vec![Expr::var("k"), Expr::var("ii")]),
                ),
            ),
        ),
    }
}

fn full_program(n: i64) -> (Program, Schedule) {
    let program = Program {
        nests: vec![
            wavefront_nest(n),
            feeder_nest(n),
            loader_nest(n),
            drainer_nest(n),
        ],
    };
    let schedule = Schedule::new()
        .with_transform("C", wavefront_transform())
        .with_scatter_buffer(ScatterBufferDirective {
            consumer: "A_feeder".into(),
            producer: "A".into(),
            scatter_loop: Some("ii".into()),
            buffer_loop: None,
            strategy: Strategy::Up,
            removed_in_producer: vec![],
        })
        .with_scatter_buffer(ScatterBufferDirective {
            consumer: "B_loader".into(),
            producer: "B".into(),
            scatter_loop: None,
            buffer_loop: Some("j".into()),
            strategy: Strategy::Up,
            removed_in_producer: vec!["jj".into()],
        })
        .with_gather(GatherDirective {
            consumer: "C_drain".into(),
            producer: "Cout".into(),
            gather_loop: "ii".into(),
            strategy: Strategy::Down,
        });
    (program, schedule)
}

// KPI: space-time transform latency vs problem size.
fn bench_kpi_space_time_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/space_time_latency");

    for n in [4_i64, 16, 64] {
        let program = Program {
            nests: vec![wavefront_nest(n)],
        };
        let schedule = Schedule::new().with_transform("C", wavefront_transform());
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let out = stc::pipeline::compile(black_box(&program), black_box(&schedule))
                    .expect("benchmark scenario must compile");
                black_box(&out.program);
            });
        });
    }

    group.finish();
}

// KPI: full pipeline latency (transform + scatter + buffer + gather).
fn bench_kpi_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/full_compile_latency");

    for n in [4_i64, 8, 16] {
        let (program, schedule) = full_program(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let out = stc::pipeline::compile(black_box(&program), black_box(&schedule))
                    .expect("benchmark scenario must compile");
                black_box(&out.report());
            });
        });
    }

    group.finish();
}

// KPI: reverse-map derivation vs matrix dimension.
fn bench_kpi_reverse_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/reverse_derivation");

    for n in [2_usize, 4, 6] {
        // Unit lower-triangular with a dense last row stays unimodular.
        let mut m = stc::matrix::identity(n);
        for i in 1..n {
            m[i][i - 1] = 2;
        }
        for j in 0..n - 1 {
            m[n - 1][j] += 1;
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| {
                let inv = stc::matrix::inverse(black_box(m));
                black_box(&inv);
            });
        });
    }

    group.finish();
}

// KPI: simplifier latency on a deep affine expression.
fn bench_kpi_simplify_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/simplify_latency");

    for depth in [16_usize, 64, 256] {
        let mut e = Expr::var("i");
        for k in 0..depth {
            e = e * Expr::int(1) + Expr::int(k as i64) - Expr::int(k as i64);
        }
        group.bench_with_input(BenchmarkId::from_parameter(depth), &e, |b, e| {
            b.iter(|| {
                let s = stc::expr::simplify(black_box(e));
                black_box(&s);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_kpi_space_time_latency,
    bench_kpi_full_compile_latency,
    bench_kpi_reverse_derivation,
    bench_kpi_simplify_latency,
);
criterion_main!(benches);
