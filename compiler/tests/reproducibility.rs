// Reproducibility tests for hermetic synthesis runs.
//
// The pipeline must produce byte-identical output for identical input:
// the transformed program, the synthesis report, and the provenance
// hashes may not depend on anything but the program and the schedule.

use stc::expr::Expr;
use stc::ir::{LoopKind, Nest, Program, Stmt};
use stc::pipeline::compile;
use stc::schedule::{
    AffineTransform, GatherDirective, ScatterBufferDirective, Schedule, Strategy,
};

/// Wavefront recurrence plus one of each data-path consumer, built fresh on
/// every call so the tests exercise independent instances.
fn full_program() -> (Program, Schedule) {
    let wavefront = Nest {
        name: "C".into(),
        body: Stmt::loop_(
            "i",
            Expr::int(0),
            Expr::int(4),
            LoopKind::Serial,
            Stmt::loop_(
                "j",
                Expr::int(0),
                Expr::int(4),
                LoopKind::Serial,
                Stmt::write(
                    "C",
                    vec![Expr::var("i"), Expr::var("j")],
                    Expr::read("C", vec![Expr::var("i") - Expr::int(1), Expr::var("j")])
                        + Expr::read("A", vec![Expr::var("i"), Expr::var("j")]),
                ),
            ),
        ),
    };
    let feeder = Nest {
        name: "A_feeder".into(),
        body: Stmt::loop_(
            "k",
            Expr::int(0),
            Expr::int(4),
            LoopKind::Serial,
            Stmt::loop_(
                "ii",
                Expr::int(0),
                Expr::int(4),
                LoopKind::Unrolled,
                Stmt::write(
                    "A_feeder",
                    vec![Expr::var("k"), Expr::var("ii")],
                    Expr::read("A", vec![Expr::var("k"), Expr::var("ii")]),
                ),
            ),
        ),
    };
    let loader = Nest {
        name: "B_loader".into(),
        body: Stmt::loop_(
            "j",
            Expr::int(0),
            Expr::int(4),
            LoopKind::Serial,
            Stmt::loop_(
                "k",
                Expr::int(0),
                Expr::int(4),
                LoopKind::Serial,
                Stmt::loop_(
                    "jj",
                    Expr::int(0),
                    Expr::int(4),
                    LoopKind::Serial,
                    Stmt::write(
                        "B_loader",
                        vec![Expr::var("j"), Expr::var("k"), Expr::var("jj")],
                        Expr::read("B", vec![Expr::var("j"), Expr::var("k")]),
                    ),
                ),
            ),
        ),
    };
    let drainer = Nest {
        name: "C_drain".into(),
        body: Stmt::loop_(
            "k",
            Expr::int(0),
            Expr::int(4),
            LoopKind::Serial,
            Stmt::loop_(
                "ii",
                Expr::int(0),
                Expr::int(4),
                LoopKind::Unrolled,
                Stmt::write(
                    "C_drain",
                    vec![Expr::var("k"), Expr::var("ii")],
                    Expr::read("Cout", vec![Expr::var("k"), Expr::var("ii")]),
                ),
            ),
        ),
    };

    let program = Program {
        nests: vec![wavefront, feeder, loader, drainer],
    };
    let schedule = Schedule::new()
        .with_transform(
            "C",
            AffineTransform::new(vec!["j", "i"], vec!["s", "t"], vec![vec![1, 0]], vec![1, 1]),
        )
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

#[test]
fn identical_inputs_produce_identical_programs() {
    let (program_a, schedule_a) = full_program();
    let (program_b, schedule_b) = full_program();
    let first = compile(&program_a, &schedule_a).unwrap();
    let second = compile(&program_b, &schedule_b).unwrap();
    assert_eq!(first.program, second.program);
    assert_eq!(first.program.to_string(), second.program.to_string());
    assert_eq!(first.provenance, second.provenance);
}

#[test]
fn report_json_is_byte_identical_across_runs() {
    let (program, schedule) = full_program();
    let first = compile(&program, &schedule).unwrap();
    let second = compile(&program, &schedule).unwrap();
    assert_eq!(
        first.report().to_json().unwrap(),
        second.report().to_json().unwrap()
    );
}

#[test]
fn provenance_separates_source_from_output() {
    let (program, schedule) = full_program();
    let out = compile(&program, &schedule).unwrap();
    assert_eq!(out.provenance.source_hash_hex().len(), 64);
    assert_eq!(out.provenance.output_hash_hex().len(), 64);
    assert_ne!(
        out.provenance.source_hash_hex(),
        out.provenance.output_hash_hex()
    );
    assert!(out
        .provenance
        .source_hash_hex()
        .chars()
        .all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn schedule_changes_move_the_output_hash() {
    let (program, schedule) = full_program();
    let baseline = compile(&program, &schedule).unwrap();

    let (program2, _) = full_program();
    let schedule2 = Schedule::new().with_transform(
        "C",
        AffineTransform::new(vec!["j", "i"], vec!["s", "t"], vec![vec![1, 0]], vec![1, 1]),
    );
    let reduced = compile(&program2, &schedule2).unwrap();
    assert_eq!(
        baseline.provenance.source_hash,
        reduced.provenance.source_hash
    );
    assert_ne!(
        baseline.provenance.output_hash,
        reduced.provenance.output_hash
    );
}
