// gather.rs — Gather-chain synthesis for one producer/consumer pair
//
// The dual of scattering: every PE of the gather loop holds one value, and
// only the boundary PE has a real connection to the collector. All PEs load
// the chain on the first clock; on every following clock the chain shifts
// one hop toward the boundary, so the collector drains one element per
// clock into a sequential stream.
//
// Preconditions: the read site came from `check::locate_read` and the
//   gather loop is unrolled with constant bounds.
// Postconditions: the producer array is read only when loading the chain;
//   the collector reads a single chain slot.
// Failure modes: `SchemaError` / `NonConstantBoundError` via the loop
//   checks.
// Side effects: none.

use crate::check::{self, ReadSite};
use crate::expr::{self, Expr};
use crate::ir::{Dim, LoopInfo, LoopKind, Nest, Stmt};
use crate::names::NameGen;
use crate::scatter::{loop_body, replace_loop, ChainDecl};
use crate::schedule::{GatherDirective, Strategy};

#[derive(Debug)]
pub struct GatherResult {
    pub nest: Nest,
    pub chain: ChainDecl,
}

pub fn apply(
    nest: &Nest,
    site: &ReadSite,
    directive: &GatherDirective,
    names: &mut NameGen,
) -> Result<GatherResult, crate::diag::Diagnostic> {
    let loc = crate::diag::Loc::func(&nest.name);
    let gather_var = directive.gather_loop.as_str();
    let (pos, gl) = check::find_loop(&site.loops, gather_var, &loc)?;
    let (min, extent) = check::require_unrolled_const(gl, &loc)?;

    let reg_name = names.fresh(&format!("{}_gather_shreg", directive.producer));
    let clock_var = names.fresh(&format!("{}_gather", gather_var));

    let above_unrolled: Vec<&LoopInfo> = site.loops[..pos]
        .iter()
        .filter(|l| l.kind == LoopKind::Unrolled)
        .collect();
    let mut dims: Vec<Dim> = above_unrolled
        .iter()
        .map(|l| Dim::new(l.min.clone(), l.extent.clone()))
        .collect();
    dims.push(Dim::new(Expr::int(min), Expr::int(extent)));
    let lead: Vec<Expr> = above_unrolled
        .iter()
        .map(|l| Expr::var(l.var.clone()))
        .collect();
    let slot = |i: Expr| -> Vec<Expr> {
        let mut v = lead.clone();
        v.push(i);
        v
    };

    // The collector sits where the chain flow ends.
    let collector = match directive.strategy {
        Strategy::Up => min + extent - 1,
        Strategy::Down => min,
    };

    // First clock: every PE loads its own value, under the site's condition.
    let loaded = Stmt::write(
        reg_name.clone(),
        slot(Expr::var(gather_var)),
        site.read.clone(),
    );
    let loaded = match &site.condition {
        Expr::BoolConst(true) => loaded,
        cond => Stmt::if_(cond.clone(), loaded),
    };
    let load = Stmt::loop_(
        gather_var,
        Expr::int(min),
        Expr::int(extent),
        LoopKind::Unrolled,
        loaded,
    );

    // Later clocks: one hop toward the collector. Collector-side copies run
    // first so each slot takes its neighbor's previous-clock value.
    let mut moves = Vec::new();
    match directive.strategy {
        Strategy::Up => {
            for i in ((min + 1)..(min + extent)).rev() {
                moves.push(Stmt::write(
                    reg_name.clone(),
                    slot(Expr::int(i)),
                    Expr::read(reg_name.clone(), slot(Expr::int(i - 1))),
                ));
            }
        }
        Strategy::Down => {
            for i in min..(min + extent - 1) {
                moves.push(Stmt::write(
                    reg_name.clone(),
                    slot(Expr::int(i)),
                    Expr::read(reg_name.clone(), slot(Expr::int(i + 1))),
                ));
            }
        }
    }
    let feed = Stmt::if_else(
        Expr::var(clock_var.clone()).eq(Expr::int(min)),
        load,
        Stmt::seq(moves),
    );

    // The PE whose value reaches the collector this clock.
    let arrived = match directive.strategy {
        Strategy::Up => {
            expr::simplify(&(Expr::int(2 * min + extent - 1) - Expr::var(clock_var.clone())))
        }
        Strategy::Down => Expr::var(clock_var.clone()),
    };
    let local = Expr::read(reg_name.clone(), slot(Expr::int(collector)));
    let below = loop_body(&nest.body, gather_var, &loc)?;
    let collected = crate::ir::replace_expr(&site.read, &local, &below);
    let collect = crate::ir::substitute(gather_var, &arrived, &collected);

    let clocked = Stmt::loop_(
        clock_var,
        Expr::int(min),
        Expr::int(extent),
        LoopKind::Serial,
        Stmt::seq(vec![feed, collect]),
    );
    let replacement = Stmt::alloc(reg_name.clone(), dims, clocked);
    let body = replace_loop(&nest.body, gather_var, replacement);

    Ok(GatherResult {
        nest: Nest {
            name: nest.name.clone(),
            body,
        },
        chain: ChainDecl {
            reg_name,
            producer: directive.producer.clone(),
            consumer: nest.name.clone(),
            extent,
            strategy: directive.strategy,
        },
    })
}

// ── Tests ────────────────────────────────────────────────────────────────
