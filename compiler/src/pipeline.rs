// pipeline.rs — Transform orchestration and synthesis report
//
// Runs the passes in dependency order over a cloned program: descriptor
// validation, space-time transformation, then the data-path synthesizers
// (scatter, buffer, gather). Collects every synthesized declaration into a
// machine-readable report with provenance hashes.
//
// Preconditions: none beyond well-formed inputs; everything else is
//   diagnosed.
// Postconditions: on success every directive has been applied and the
//   report lists every register, chain, and buffer.
// Failure modes: the first fatal diagnostic aborts compilation; the input
//   program is never mutated.
// Side effects: calls the on_pass_complete callback after each pass.

use crate::buffer::{self, BufferDecl, CycleDecl};
use crate::check;
use crate::diag::{codes, Diagnostic, Loc};
use crate::gather;
use crate::ir::Program;
use crate::names::NameGen;
use crate::pass::PassId;
use crate::scatter::{self, ChainDecl};
use crate::schedule::Schedule;
use crate::space_time;

// ── Report entries ─────────────────────────────────────────────────────────

/// One synthesized shift register, for the report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegisterEntry {
    pub nest: String,
    pub array: String,
    pub reg_name: String,
    pub depth: i64,
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible synthesis runs.
///
/// `source_hash`: SHA-256 of the canonical text of the input program.
/// `output_hash`: SHA-256 of the canonical text of the transformed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub output_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn output_hash_hex(&self) -> String {
        bytes_to_hex(&self.output_hash)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Compute provenance from the canonical program texts.
pub fn compute_provenance(source: &str, output: &str) -> Provenance {
    Provenance {
        source_hash: sha256(source),
        output_hash: sha256(output),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Compiled result ────────────────────────────────────────────────────────

/// Successful pipeline output: the transformed program plus every
/// declaration the back end needs, and the non-fatal warnings.
#[derive(Debug)]
pub struct Compiled {
    pub program: Program,
    pub registers: Vec<RegisterEntry>,
    pub chains: Vec<ChainDecl>,
    pub buffers: Vec<BufferDecl>,
    pub cycles: Vec<CycleDecl>,
    pub warnings: Vec<Diagnostic>,
    pub provenance: Provenance,
}

/// Serializable synthesis report for `Compiled`.
#[derive(Debug, serde::Serialize)]
pub struct SynthesisReport {
    pub compiler_version: String,
    pub source_hash: String,
    pub output_hash: String,
    pub registers: Vec<RegisterEntry>,
    pub chains: Vec<ChainDecl>,
    pub buffers: Vec<BufferDecl>,
    pub cycles: Vec<CycleDecl>,
    pub warnings: Vec<String>,
}

impl SynthesisReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Compiled {
    pub fn report(&self) -> SynthesisReport {
        SynthesisReport {
            compiler_version: self.provenance.compiler_version.to_string(),
            source_hash: self.provenance.source_hash_hex(),
            output_hash: self.provenance.output_hash_hex(),
            registers: self.registers.clone(),
            chains: self.chains.clone(),
            buffers: self.buffers.clone(),
            cycles: self.cycles.clone(),
            warnings: self.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

fn nest_index(prog: &Program, name: &str) -> Result<usize, Diagnostic> {
    prog.nests
        .iter()
        .position(|n| n.name == name)
        .ok_or_else(|| {
            Diagnostic::error(
                Loc::func(name),
                format!("unknown recurrence function {}", name),
            )
            .with_code(codes::SCHEMA_ERROR)
        })
}

/// Run every pass the schedule calls for.
pub fn compile(program: &Program, schedule: &Schedule) -> Result<Compiled, Diagnostic> {
    compile_observed(program, schedule, |_| {})
}

/// Like `compile`, calling `on_pass_complete` after each pass.
pub fn compile_observed(
    program: &Program,
    schedule: &Schedule,
    mut on_pass_complete: impl FnMut(PassId),
) -> Result<Compiled, Diagnostic> {
    let source_text = program.to_string();

    for (name, t) in &schedule.transforms {
        t.validate(&Loc::func(name))?;
    }
    for d in &schedule.scatter_buffer {
        d.validate()?;
    }
    on_pass_complete(PassId::Validate);

    let mut prog = program.clone();
    let mut registers = Vec::new();
    for (name, xform) in &schedule.transforms {
        let idx = nest_index(&prog, name)?;
        let result = space_time::apply(&prog.nests[idx], xform)?;
        for r in &result.registers {
            registers.push(RegisterEntry {
                nest: name.clone(),
                array: r.array.clone(),
                reg_name: r.reg_name.clone(),
                depth: r.depth(),
            });
        }
        prog.nests[idx] = result.nest;
    }
    on_pass_complete(PassId::SpaceTime);

    let mut names = NameGen::new();
    let mut chains = Vec::new();
    let mut buffers = Vec::new();
    let mut cycles = Vec::new();
    let mut warnings = Vec::new();

    for d in schedule
        .scatter_buffer
        .iter()
        .filter(|d| d.buffer_loop.is_none())
    {
        let idx = nest_index(&prog, &d.consumer)?;
        let site = check::locate_read(&prog.nests[idx], &d.producer)?;
        let result = scatter::apply(&prog.nests[idx], &site, d, &mut names)?;
        chains.push(result.chain);
        prog.nests[idx] = result.nest;
    }
    on_pass_complete(PassId::Scatter);

    for d in schedule
        .scatter_buffer
        .iter()
        .filter(|d| d.buffer_loop.is_some())
    {
        let idx = nest_index(&prog, &d.consumer)?;
        let site = check::locate_read(&prog.nests[idx], &d.producer)?;
        let result = buffer::apply(&prog.nests[idx], &site, d, &mut names)?;
        buffers.push(result.buffer);
        cycles.push(result.cycle);
        chains.extend(result.chains);
        warnings.extend(result.warnings);
        prog.nests[idx] = result.nest;
    }
    on_pass_complete(PassId::Buffer);

    for d in &schedule.gather {
        let idx = nest_index(&prog, &d.consumer)?;
        let site = check::locate_read(&prog.nests[idx], &d.producer)?;
        let result = gather::apply(&prog.nests[idx], &site, d, &mut names)?;
        chains.push(result.chain);
        prog.nests[idx] = result.nest;
    }
    on_pass_complete(PassId::Gather);

    let provenance = compute_provenance(&source_text, &prog.to_string());
    on_pass_complete(PassId::Report);

    Ok(Compiled {
        program: prog,
        registers,
        chains,
        buffers,
        cycles,
        warnings,
        provenance,
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::ir::{LoopKind, Nest, Stmt};
    use crate::schedule::AffineTransform;

    fn wavefront_program() -> Program {
        // C[i, j] = C[i - 1, j] + A[i, j] over [0, 4) x [0, 4).
        Program {
            nests: vec![Nest {
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
            }],
        }
    }

    fn wavefront_schedule() -> Schedule {
        Schedule::new().with_transform(
            "C",
            AffineTransform::new(vec!["j", "i"], vec!["s", "t"], vec![vec![1, 0]], vec![1, 1]),
        )
    }

    #[test]
    fn wavefront_compiles_to_one_register() {
        let out = compile(&wavefront_program(), &wavefront_schedule()).unwrap();
        assert_eq!(out.registers.len(), 1);
        assert_eq!(out.registers[0].array, "C");
        assert_eq!(out.registers[0].depth, 1);
        let text = out.program.to_string();
        assert!(text.contains("unrolled s in [0, 0+4):"), "{}", text);
        assert!(text.contains("for t in"), "{}", text);
    }

    #[test]
    fn unknown_nest_is_a_schema_error() {
        let schedule = Schedule::new().with_transform(
            "ghost",
            AffineTransform::new(vec!["j", "i"], vec!["s", "t"], vec![vec![1, 0]], vec![1, 1]),
        );
        let err = compile(&wavefront_program(), &schedule).unwrap_err();
        assert_eq!(err.code, Some(codes::SCHEMA_ERROR));
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn passes_complete_in_dependency_order() {
        let mut seen = Vec::new();
        compile_observed(&wavefront_program(), &wavefront_schedule(), |p| {
            seen.push(p)
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                PassId::Validate,
                PassId::SpaceTime,
                PassId::Scatter,
                PassId::Buffer,
                PassId::Gather,
                PassId::Report,
            ]
        );
    }

    #[test]
    fn provenance_hashes_are_stable_hex() {
        let a = compile(&wavefront_program(), &wavefront_schedule()).unwrap();
        let b = compile(&wavefront_program(), &wavefront_schedule()).unwrap();
        assert_eq!(a.provenance, b.provenance);
        assert_eq!(a.provenance.source_hash_hex().len(), 64);
        assert_ne!(a.provenance.source_hash, a.provenance.output_hash);
    }

    #[test]
    fn report_serializes_every_declaration() {
        let out = compile(&wavefront_program(), &wavefront_schedule()).unwrap();
        let json = out.report().to_json().unwrap();
        assert!(json.contains("\"reg_name\": \"C_shreg\""), "{}", json);
        assert!(json.contains("\"output_hash\""), "{}", json);
    }
}
