// buffer.rs — Double-buffer synthesis with cyclic scheduling
//
// Replaces the serial loops of a consumer nest with a single clocked
// controller driven by a per-PE cycle counter. Each period of
// CYCLES_PER_PERIOD clocks writes one producer block into one bank of a
// ping-pong buffer while the PEs read the previous block from the other
// bank; loop variables are reconstructed from the counter by mixed-radix
// decode. When the directive also names a scatter loop, values travel to
// their owning PE over a propagation chain carrying (value, time stamp)
// pairs, and the buffer gains a power-of-two bank dimension per PE.
//
// Preconditions: read site from `check::locate_read`; the site's loops lie
//   on the nest's loop spine.
// Postconditions: the synthesized nest has exactly one serial loop (the
//   clock); every former serial loop variable is reconstructed by a `Let`.
// Failure modes: `NonConstantBoundError` for any non-constant serial bound,
//   `SchemaError` for malformed directives.
// Side effects: none.

use crate::check::{self, ReadSite};
use crate::diag::{codes, Diagnostic, Loc};
use crate::expr::{self, Expr};
use crate::ir::{self, Dim, LoopInfo, LoopKind, Nest, Stmt};
use crate::names::NameGen;
use crate::scatter::{replace_loop, ChainDecl};
use crate::schedule::{ScatterBufferDirective, Strategy};

// ── Declarations for the report ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BufferDecl {
    pub name: String,
    pub producer: String,
    pub consumer: String,
    /// Extents, bank-pair dimension first.
    pub dims: Vec<i64>,
    /// Power-of-two PE bank count when scatter is combined in.
    pub banks: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CycleDecl {
    pub consumer: String,
    pub reads: i64,
    pub writes: i64,
    pub cycles_per_period: i64,
    pub init: i64,
    pub periods: i64,
}

impl CycleDecl {
    pub fn time_to_write(&self, offset: i64) -> bool {
        offset >= self.init
    }

    pub fn time_to_read(&self, period: i64, offset: i64) -> bool {
        period > 0 && period <= self.periods && (self.reads >= self.writes || offset < self.reads)
    }
}

#[derive(Debug)]
pub struct BufferResult {
    pub nest: Nest,
    pub buffer: BufferDecl,
    pub cycle: CycleDecl,
    pub chains: Vec<ChainDecl>,
    pub warnings: Vec<Diagnostic>,
}

// ── Constant loop view ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct LoopConst {
    var: String,
    min: i64,
    extent: i64,
}

fn const_loop(l: &LoopInfo, loc: &Loc) -> Result<LoopConst, Diagnostic> {
    let (min, extent) = check::const_bounds(l, loc)?;
    Ok(LoopConst {
        var: l.var.clone(),
        min,
        extent,
    })
}

/// Mixed-radix reconstruction of loop variables from a counter value,
/// `loops` outermost-first. Processed innermost-out; the outermost term
/// needs no modulo because the counter is exhausted by then.
fn decode_lets(value: &Expr, loops: &[LoopConst]) -> Vec<(String, Expr)> {
    let mut binds = Vec::new();
    let mut div = 1i64;
    for (i, l) in loops.iter().enumerate().rev() {
        let q = if div == 1 {
            value.clone()
        } else {
            value.clone().div(Expr::int(div))
        };
        let e = if i == 0 { q } else { q.rem(Expr::int(l.extent)) };
        let e = if l.min != 0 { e + Expr::int(l.min) } else { e };
        binds.push((l.var.clone(), expr::simplify(&e)));
        div *= l.extent;
    }
    binds.reverse();
    binds
}

fn product(loops: &[LoopConst]) -> i64 {
    loops.iter().map(|l| l.extent).product()
}

fn next_pow2(v: i64) -> i64 {
    (v.max(1) as u64).next_power_of_two() as i64
}

// ── Entry point ──────────────────────────────────────────────────────────

pub fn apply(
    nest: &Nest,
    site: &ReadSite,
    directive: &ScatterBufferDirective,
    names: &mut NameGen,
) -> Result<BufferResult, Diagnostic> {
    let loc = Loc::func(&nest.name);
    let buffer_var = directive
        .buffer_loop
        .as_deref()
        .expect("buffer synthesis requires a buffer loop");
    let (bpos, _) = check::find_loop(&site.loops, buffer_var, &loc)?;

    // The controller enumerates every serial loop, so all of them need
    // constant bounds; at or below the buffer level this is the classic
    // fixed-shape requirement.
    let scatter = match directive.scatter_loop.as_deref() {
        Some(sv) => {
            let (spos, sl) = check::find_loop(&site.loops, sv, &loc)?;
            if spos <= bpos {
                return Err(Diagnostic::error(
                    Loc::in_loop(nest.name.clone(), sv),
                    "scatter loop must sit below the buffer loop".to_string(),
                )
                .with_code(codes::SCHEMA_ERROR));
            }
            check::require_unrolled_const(sl, &loc)?;
            Some(const_loop(sl, &loc)?)
        }
        None => None,
    };

    let mut above_serial = Vec::new(); // incl. the buffer loop
    for l in &site.loops[..=bpos] {
        if l.kind == LoopKind::Serial {
            above_serial.push(const_loop(l, &loc)?);
        }
    }
    let mut below_serial = Vec::new();
    for l in &site.loops[bpos + 1..] {
        if l.kind == LoopKind::Serial {
            below_serial.push(const_loop(l, &loc)?);
        }
    }
    let unrolled_wrap: Vec<LoopConst> = {
        let mut v = Vec::new();
        for l in &site.loops {
            if l.kind == LoopKind::Unrolled
                && Some(l.var.as_str()) != directive.scatter_loop.as_deref()
            {
                v.push(const_loop(l, &loc)?);
            }
        }
        v
    };

    // A loop the producer skips must be one the controller enumerates.
    for name in &directive.removed_in_producer {
        if !below_serial.iter().any(|l| &l.var == name) {
            return Err(Diagnostic::error(
                Loc::in_loop(nest.name.clone(), name.clone()),
                format!(
                    "removed loop {} is not a serial loop below the buffer loop",
                    name
                ),
            )
            .with_code(codes::SCHEMA_ERROR));
        }
    }

    let read_loops = below_serial.clone();
    let write_loops: Vec<LoopConst> = below_serial
        .iter()
        .filter(|l| !directive.removed_in_producer.contains(&l.var))
        .cloned()
        .collect();
    let removed: Vec<LoopConst> = below_serial
        .iter()
        .filter(|l| directive.removed_in_producer.contains(&l.var))
        .cloned()
        .collect();

    let reads = product(&read_loops);
    let writes = product(&write_loops) * scatter.as_ref().map_or(1, |s| s.extent);
    let cpp = reads.max(writes);
    let init = (reads - writes).max(0);
    let periods = product(&above_serial);
    let cycle = CycleDecl {
        consumer: nest.name.clone(),
        reads,
        writes,
        cycles_per_period: cpp,
        init,
        periods,
    };

    let mut warnings = Vec::new();
    if reads < writes {
        warnings.push(
            Diagnostic::warning(
                Loc::in_loop(nest.name.clone(), buffer_var),
                format!(
                    "buffer reads {} values per period but receives {}; producer latency is not hidden",
                    reads, writes
                ),
            )
            .with_code(codes::LATENCY_HIDING_VIOLATION),
        );
    }

    // Names.
    let db_name = names.fresh(&format!("{}_db", directive.producer));
    let cycle_reg = names.fresh(&format!("{}_cycle", nest.name));
    let clock_var = names.fresh(&format!("{}_t", nest.name));
    let v_cycle = names.fresh("_cycle");
    let v_period = names.fresh("_period");
    let v_offset = names.fresh("_offset");
    let v_idx = names.fresh("_idx");

    let u_idx: Vec<Expr> = unrolled_wrap
        .iter()
        .map(|l| Expr::var(l.var.clone()))
        .collect();
    let banks = scatter.as_ref().map(|s| next_pow2(s.extent));
    let mut db_dims = vec![Dim::new(Expr::int(0), Expr::int(2))];
    for l in &write_loops {
        db_dims.push(Dim::new(Expr::int(l.min), Expr::int(l.extent)));
    }
    if let Some(b) = banks {
        db_dims.push(Dim::new(Expr::int(0), Expr::int(b)));
    }
    let db_args = |bank: Expr, pe: Option<Expr>| -> Vec<Expr> {
        let mut v = vec![bank];
        for l in &write_loops {
            v.push(Expr::var(l.var.clone()));
        }
        if let Some(pe) = pe {
            v.push(pe);
        }
        v
    };

    let body_below = ir::spine_body(&nest.body).clone();
    let write_cycle = Expr::var(v_offset.clone()) - Expr::int(init);

    // Gates, straight from the cyclic schedule.
    let ttw_gate = Expr::var(v_period.clone())
        .lt(Expr::int(periods))
        .and(Expr::var(v_offset.clone()).ge(Expr::int(init)));
    let mut ttr_gate = Expr::var(v_period.clone())
        .gt(Expr::int(0))
        .and(Expr::var(v_period.clone()).le(Expr::int(periods)));
    if reads < writes {
        ttr_gate = ttr_gate.and(Expr::var(v_offset.clone()).lt(Expr::int(reads)));
    }

    // Read side is shared between the plain and combined paths.
    let read_side = |pe: Option<Expr>| -> Stmt {
        let mut binds = decode_lets(
            &(Expr::var(v_period.clone()) - Expr::int(1)),
            &above_serial,
        );
        binds.extend(decode_lets(&Expr::var(v_offset.clone()), &read_loops));
        let bank = Expr::int(1) - Expr::var(v_idx.clone());
        let local = Expr::read(db_name.clone(), db_args(bank, pe));
        let body = ir::replace_expr(&site.read, &local, &body_below);
        Stmt::if_(ttr_gate.clone(), Stmt::lets(binds, body))
    };

    let per_clock = match &scatter {
        None => {
            // Plain: one memory port feeds the write bank directly.
            let mut binds = decode_lets(&Expr::var(v_period.clone()), &above_serial);
            for l in &removed {
                binds.push((l.var.clone(), Expr::int(l.min)));
            }
            binds.extend(decode_lets(&write_cycle, &write_loops));
            let store = Stmt::write(
                db_name.clone(),
                db_args(Expr::var(v_idx.clone()), None),
                site.read.clone(),
            );
            let store = match &site.condition {
                Expr::BoolConst(true) => store,
                cond => Stmt::if_(cond.clone(), store),
            };
            let write_side = Stmt::if_(ttw_gate.clone(), Stmt::lets(binds, store));
            Stmt::seq(vec![write_side, read_side(None)])
        }
        Some(s) => combined_per_clock(
            s,
            directive,
            site,
            &above_serial,
            &write_loops,
            &removed,
            &cycle,
            &db_name,
            &db_args,
            &ttw_gate,
            &read_side,
            &v_cycle,
            &v_period,
            &v_offset,
            names,
        ),
    };

    // The combined path carries one value and one stamp register per
    // directive; declare both for the report.
    let chains = match &scatter {
        Some(s) => vec![
            ChainDecl {
                reg_name: format!("{}_value_shreg", directive.producer),
                producer: directive.producer.clone(),
                consumer: nest.name.clone(),
                extent: s.extent,
                strategy: directive.strategy,
            },
            ChainDecl {
                reg_name: format!("{}_stamp_shreg", directive.producer),
                producer: directive.producer.clone(),
                consumer: nest.name.clone(),
                extent: s.extent,
                strategy: directive.strategy,
            },
        ],
        None => Vec::new(),
    };

    // Per-clock counter bookkeeping.
    let bump = Stmt::write(
        cycle_reg.clone(),
        u_idx.clone(),
        Expr::var(v_cycle.clone()) + Expr::int(1),
    );
    let clocked = Stmt::lets(
        vec![
            (v_cycle.clone(), Expr::read(cycle_reg.clone(), u_idx.clone())),
            (
                v_period.clone(),
                Expr::var(v_cycle.clone()).div(Expr::int(cpp)),
            ),
            (
                v_offset.clone(),
                Expr::var(v_cycle.clone()).rem(Expr::int(cpp)),
            ),
            (
                v_idx.clone(),
                Expr::var(v_period.clone()).rem(Expr::int(2)),
            ),
        ],
        Stmt::seq(vec![per_clock, bump]),
    );

    let mut inner = clocked;
    for l in unrolled_wrap.iter().rev() {
        inner = Stmt::loop_(
            l.var.clone(),
            Expr::int(l.min),
            Expr::int(l.extent),
            LoopKind::Unrolled,
            inner,
        );
    }
    // One extra period drains the last block.
    let total = (periods + 1) * cpp;
    let clock_loop = Stmt::loop_(
        clock_var,
        Expr::int(0),
        Expr::int(total),
        LoopKind::Serial,
        inner,
    );

    let mut reset = Stmt::write(cycle_reg.clone(), u_idx.clone(), Expr::int(0));
    for l in unrolled_wrap.iter().rev() {
        reset = Stmt::loop_(
            l.var.clone(),
            Expr::int(l.min),
            Expr::int(l.extent),
            LoopKind::Unrolled,
            reset,
        );
    }

    let mut body = Stmt::seq(vec![reset, clock_loop]);
    if let Some(s) = &scatter {
        let chain_dim = vec![Dim::new(Expr::int(s.min), Expr::int(s.extent))];
        body = Stmt::alloc(
            format!("{}_stamp_shreg", directive.producer),
            chain_dim.clone(),
            body,
        );
        body = Stmt::alloc(
            format!("{}_value_shreg", directive.producer),
            chain_dim,
            body,
        );
    }
    let cycle_dims: Vec<Dim> = unrolled_wrap
        .iter()
        .map(|l| Dim::new(Expr::int(l.min), Expr::int(l.extent)))
        .collect();
    body = Stmt::alloc(cycle_reg, cycle_dims, body);
    body = Stmt::alloc(db_name.clone(), db_dims.clone(), body);

    // The whole consumer collapses into the controller: everything from the
    // outermost serial loop down is replaced.
    let outermost = &site.loops[0].var;
    let new_body = replace_loop(&nest.body, outermost, body);

    Ok(BufferResult {
        nest: Nest {
            name: nest.name.clone(),
            body: ir::simplify(&new_body),
        },
        buffer: BufferDecl {
            name: db_name,
            producer: directive.producer.clone(),
            consumer: nest.name.clone(),
            dims: db_dims
                .iter()
                .map(|d| d.extent.as_const().unwrap_or(0))
                .collect(),
            banks,
        },
        cycle,
        chains,
        warnings,
    })
}

// ── Combined scatter + buffer per-clock body ─────────────────────────────

/// The feed enters at the chain boundary tagged with the cycle it was read
/// on; each PE decodes ownership from the tag, so values written several
/// hops ago still land in the right bank and address.
#[allow(clippy::too_many_arguments)]
fn combined_per_clock(
    s: &LoopConst,
    directive: &ScatterBufferDirective,
    site: &ReadSite,
    above_serial: &[LoopConst],
    write_loops: &[LoopConst],
    removed: &[LoopConst],
    cycle: &CycleDecl,
    db_name: &str,
    db_args: &impl Fn(Expr, Option<Expr>) -> Vec<Expr>,
    ttw_gate: &Expr,
    read_side: &impl Fn(Option<Expr>) -> Stmt,
    v_cycle: &str,
    v_period: &str,
    v_offset: &str,
    names: &mut NameGen,
) -> Stmt {
    let value_reg = format!("{}_value_shreg", directive.producer);
    let stamp_reg = format!("{}_stamp_shreg", directive.producer);
    let v_stamp = names.fresh("_stamp");
    let v_wp = names.fresh("_wperiod");
    let v_wo = names.fresh("_woffset");

    let boundary = match directive.strategy {
        Strategy::Up => s.min,
        Strategy::Down => s.min + s.extent - 1,
    };
    let write_cycle = Expr::var(v_offset) - Expr::int(cycle.init);

    // Injection: decode the element due this clock (scatter position is the
    // innermost radix digit) and tag it with the cycle counter.
    let mut inject_binds = decode_lets(&Expr::var(v_period), above_serial);
    for l in removed {
        inject_binds.push((l.var.clone(), Expr::int(l.min)));
    }
    let mut feed_radix: Vec<LoopConst> = write_loops.to_vec();
    feed_radix.push(s.clone());
    inject_binds.extend(decode_lets(&write_cycle, &feed_radix));
    let store = Stmt::seq(vec![
        Stmt::write(value_reg.clone(), vec![Expr::int(boundary)], site.read.clone()),
        Stmt::write(
            stamp_reg.clone(),
            vec![Expr::int(boundary)],
            Expr::var(v_cycle),
        ),
    ]);
    let store = match &site.condition {
        Expr::BoolConst(true) => store,
        cond => Stmt::if_(cond.clone(), store),
    };
    let inject = Stmt::if_(ttw_gate.clone(), Stmt::lets(inject_binds, store));

    // Chain moves, far end first so each hop takes one clock.
    let mut moves = Vec::new();
    let mut push_move = |dst: i64, src: i64| {
        moves.push(Stmt::write(
            value_reg.clone(),
            vec![Expr::int(dst)],
            Expr::read(value_reg.clone(), vec![Expr::int(src)]),
        ));
        moves.push(Stmt::write(
            stamp_reg.clone(),
            vec![Expr::int(dst)],
            Expr::read(stamp_reg.clone(), vec![Expr::int(src)]),
        ));
    };
    match directive.strategy {
        Strategy::Up => {
            for i in ((s.min + 1)..(s.min + s.extent)).rev() {
                push_move(i, i - 1);
            }
        }
        Strategy::Down => {
            for i in s.min..(s.min + s.extent - 1) {
                push_move(i, i + 1);
            }
        }
    }
    moves.push(inject);
    let chain = Stmt::seq(moves);

    // Per-PE: decode the arriving stamp; the owner digit says which PE the
    // value belongs to, the rest of the stamp says where it goes.
    let owner = expr::simplify(
        &((Expr::var(v_wo.clone()) - Expr::int(cycle.init)).rem(Expr::int(s.extent))
            + Expr::int(s.min)),
    );
    let stamp_write_cycle = Expr::var(v_wo.clone()) - Expr::int(cycle.init);
    let mut pe_binds = decode_lets(&Expr::var(v_wp.clone()), above_serial);
    for l in removed {
        pe_binds.push((l.var.clone(), Expr::int(l.min)));
    }
    pe_binds.extend(decode_lets(
        &stamp_write_cycle.clone().div(Expr::int(s.extent)),
        write_loops,
    ));
    let bank = Expr::var(v_wp.clone()).rem(Expr::int(2));
    let pe_index = expr::simplify(&(Expr::var(s.var.clone()) - Expr::int(s.min)));
    let store_pe = Stmt::write(
        db_name.to_string(),
        db_args(bank, Some(pe_index.clone())),
        Expr::read(value_reg, vec![Expr::var(s.var.clone())]),
    );
    let own_gate = Expr::var(v_wp.clone())
        .lt(Expr::int(cycle.periods))
        .and(Expr::var(v_wo.clone()).ge(Expr::int(cycle.init)))
        .and(Expr::var(s.var.clone()).eq(owner));
    let pe_write = Stmt::if_(own_gate, Stmt::lets(pe_binds, store_pe));

    let pe_block = Stmt::loop_(
        s.var.clone(),
        Expr::int(s.min),
        Expr::int(s.extent),
        LoopKind::Unrolled,
        Stmt::lets(
            vec![
                (
                    v_stamp.clone(),
                    Expr::read(stamp_reg, vec![Expr::var(s.var.clone())]),
                ),
                (
                    v_wp.clone(),
                    Expr::var(v_stamp.clone()).div(Expr::int(cycle.cycles_per_period)),
                ),
                (
                    v_wo.clone(),
                    Expr::var(v_stamp).rem(Expr::int(cycle.cycles_per_period)),
                ),
            ],
            Stmt::seq(vec![pe_write, read_side(Some(pe_index))]),
        ),
    );

    Stmt::seq(vec![chain, pe_block])
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::locate_read;

    /// Consumer reading one producer element per (j, k) under an unrolled
    /// PE row; producer does not iterate jj (removed).
    fn consumer() -> Nest {
        Nest {
            name: "B_loader".into(),
            body: Stmt::loop_(
                "j",
                Expr::int(0),
                Expr::int(2),
                LoopKind::Serial,
                Stmt::loop_(
                    "k",
                    Expr::int(0),
                    Expr::int(2),
                    LoopKind::Serial,
                    Stmt::loop_(
                        "jj",
                        Expr::int(0),
                        Expr::int(2),
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

    fn directive() -> ScatterBufferDirective {
        ScatterBufferDirective {
            consumer: "B_loader".into(),
            producer: "B".into(),
            scatter_loop: None,
            buffer_loop: Some("j".into()),
            strategy: Strategy::Up,
            removed_in_producer: vec!["jj".into()],
        }
    }

    fn synth() -> BufferResult {
        let nest = consumer();
        let site = locate_read(&nest, "B").unwrap();
        apply(&nest, &site, &directive(), &mut NameGen::new()).unwrap()
    }

    #[test]
    fn cyclic_schedule_constants() {
        let out = synth();
        // READS over {k, jj} = 4; WRITES over {k} = 2.
        assert_eq!(out.cycle.reads, 4);
        assert_eq!(out.cycle.writes, 2);
        assert_eq!(out.cycle.cycles_per_period, 4);
        assert_eq!(out.cycle.init, 2);
        assert_eq!(out.cycle.periods, 2);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn schedule_gates_match_the_contract() {
        let out = synth();
        // INIT = 2: writes only in the second half of each period.
        assert!(!out.cycle.time_to_write(0));
        assert!(!out.cycle.time_to_write(1));
        assert!(out.cycle.time_to_write(2));
        assert!(out.cycle.time_to_write(3));
        // Reads replay the previous period only.
        assert!(!out.cycle.time_to_read(0, 0));
        assert!(out.cycle.time_to_read(1, 0));
        assert!(out.cycle.time_to_read(2, 3));
        assert!(!out.cycle.time_to_read(3, 0));
    }

    #[test]
    fn single_serial_clock_loop_with_drain() {
        let out = synth();
        let text = format!("{}", out.nest.body);
        // (PERIODS + 1) * CPP = 12 clocks.
        assert!(text.contains("for B_loader_t in [0, 0+12):"), "{}", text);
        // No other serial loop survives.
        assert_eq!(text.matches("for ").count(), 1, "{}", text);
    }

    #[test]
    fn buffer_shape_skips_removed_loops() {
        let out = synth();
        // [2 banks] x [k extent]; jj is removed, j is the buffer level.
        assert_eq!(out.buffer.dims, vec![2, 2]);
        assert_eq!(out.buffer.banks, None);
        let text = format!("{}", out.nest.body);
        assert!(text.contains("alloc B_db[0:2, 0:2]:"), "{}", text);
    }

    #[test]
    fn loop_vars_are_reconstructed_by_lets() {
        let out = synth();
        let text = format!("{}", out.nest.body);
        assert!(text.contains("let _cycle ="), "{}", text);
        assert!(text.contains("let _period ="), "{}", text);
        assert!(text.contains("let _offset ="), "{}", text);
        // Removed loop pinned to its min on the write side.
        assert!(text.contains("let jj = 0:"), "{}", text);
    }

    #[test]
    fn latency_hiding_violation_is_a_warning() {
        // Producer iterates everything: WRITES = 8 > READS = 4.
        let nest = consumer();
        let site = locate_read(&nest, "B").unwrap();
        let d = ScatterBufferDirective {
            removed_in_producer: vec![],
            ..directive()
        };
        // With no removed loop WRITES = READS; force the violation with a
        // scatter chain instead.
        let nest2 = Nest {
            name: "B_loader".into(),
            body: Stmt::loop_(
                "j",
                Expr::int(0),
                Expr::int(2),
                LoopKind::Serial,
                Stmt::loop_(
                    "k",
                    Expr::int(0),
                    Expr::int(2),
                    LoopKind::Serial,
                    Stmt::loop_(
                        "ii",
                        Expr::int(0),
                        Expr::int(4),
                        LoopKind::Unrolled,
                        Stmt::write(
                            "B_loader",
                            vec![Expr::var("j"), Expr::var("k"), Expr::var("ii")],
                            Expr::read("B", vec![Expr::var("j"), Expr::var("k"), Expr::var("ii")]),
                        ),
                    ),
                ),
            ),
        };
        let site2 = locate_read(&nest2, "B").unwrap();
        let d2 = ScatterBufferDirective {
            scatter_loop: Some("ii".into()),
            ..d
        };
        let out = apply(&nest2, &site2, &d2, &mut NameGen::new()).unwrap();
        // READS = 2 (k), WRITES = 2 * 4 = 8.
        assert_eq!(out.cycle.reads, 2);
        assert_eq!(out.cycle.writes, 8);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(
            out.warnings[0].code,
            Some(codes::LATENCY_HIDING_VIOLATION)
        );
        drop(site);
    }

    #[test]
    fn combined_path_gets_banked_buffer_and_chains() {
        let nest = Nest {
            name: "A_loader".into(),
            body: Stmt::loop_(
                "j",
                Expr::int(0),
                Expr::int(2),
                LoopKind::Serial,
                Stmt::loop_(
                    "k",
                    Expr::int(0),
                    Expr::int(4),
                    LoopKind::Serial,
                    Stmt::loop_(
                        "ii",
                        Expr::int(0),
                        Expr::int(3),
                        LoopKind::Unrolled,
                        Stmt::write(
                            "A_loader",
                            vec![Expr::var("j"), Expr::var("k"), Expr::var("ii")],
                            Expr::read("A", vec![Expr::var("j"), Expr::var("k"), Expr::var("ii")]),
                        ),
                    ),
                ),
            ),
        };
        let site = locate_read(&nest, "A").unwrap();
        let d = ScatterBufferDirective {
            consumer: "A_loader".into(),
            producer: "A".into(),
            scatter_loop: Some("ii".into()),
            buffer_loop: Some("j".into()),
            strategy: Strategy::Up,
            removed_in_producer: vec![],
        };
        let out = apply(&nest, &site, &d, &mut NameGen::new()).unwrap();
        // Banks rounded up to the next power of two.
        assert_eq!(out.buffer.banks, Some(4));
        assert_eq!(out.buffer.dims, vec![2, 4, 4]);
        assert_eq!(out.chains.len(), 2);
        let text = format!("{}", out.nest.body);
        assert!(text.contains("alloc A_value_shreg[0:3]:"), "{}", text);
        assert!(text.contains("alloc A_stamp_shreg[0:3]:"), "{}", text);
        assert!(text.contains("let _stamp ="), "{}", text);
    }

    #[test]
    fn removed_loop_must_sit_below_the_buffer_loop() {
        let nest = consumer();
        let site = locate_read(&nest, "B").unwrap();
        let d = ScatterBufferDirective {
            removed_in_producer: vec!["j".into()],
            ..directive()
        };
        let err = apply(&nest, &site, &d, &mut NameGen::new()).unwrap_err();
        assert_eq!(err.code, Some(codes::SCHEMA_ERROR));
        assert!(err.message.contains("removed loop j"), "{}", err);
    }

    #[test]
    fn non_constant_bound_is_fatal() {
        let nest = Nest {
            name: "B_loader".into(),
            body: Stmt::loop_(
                "j",
                Expr::int(0),
                Expr::var("N"),
                LoopKind::Serial,
                Stmt::write(
                    "B_loader",
                    vec![Expr::var("j")],
                    Expr::read("B", vec![Expr::var("j")]),
                ),
            ),
        };
        let site = locate_read(&nest, "B").unwrap();
        let d = ScatterBufferDirective {
            consumer: "B_loader".into(),
            producer: "B".into(),
            scatter_loop: None,
            buffer_loop: Some("j".into()),
            strategy: Strategy::Up,
            removed_in_producer: vec![],
        };
        let err = apply(&nest, &site, &d, &mut NameGen::new()).unwrap_err();
        assert_eq!(err.code, Some(codes::NON_CONSTANT_BOUND));
    }
}
