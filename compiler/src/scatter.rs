// scatter.rs — Scatter-chain synthesis for one producer/consumer pair
//
// Only the boundary PE of the scatter loop has a real connection to the
// producer; every other PE takes its value from its neighbor over a per-PE
// shift register, one register stage per hop. A new serial "target" loop
// tracks which iteration a freshly injected value is destined for; the
// consumer's original body runs only on the cycle where the scatter-loop
// index equals the target. Within a cycle the injection runs first and the
// copies follow it outward from the boundary, so the element due this
// cycle is visible at every PE when the gated body runs.
//
// Preconditions: the read site came from `check::locate_read` (unique,
//   supported condition) and the scatter loop is unrolled with constant
//   bounds.
// Postconditions: the producer array is read at exactly one index of the
//   chain (the boundary); all other PEs read the chain register.
// Failure modes: `SchemaError` / `NonConstantBoundError` via the loop
//   checks.
// Side effects: none.

use crate::check::{self, ReadSite};
use crate::diag::{codes, Diagnostic, Loc};
use crate::expr::{self, Expr};
use crate::ir::{Dim, LoopInfo, LoopKind, Nest, Stmt};
use crate::names::NameGen;
use crate::schedule::{ScatterBufferDirective, Strategy};

// ── Result ───────────────────────────────────────────────────────────────

/// Declaration of one synthesized propagation chain, for the report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainDecl {
    pub reg_name: String,
    pub producer: String,
    pub consumer: String,
    pub extent: i64,
    pub strategy: Strategy,
}

#[derive(Debug)]
pub struct ScatterResult {
    pub nest: Nest,
    pub chain: ChainDecl,
}

// ── Entry point ──────────────────────────────────────────────────────────

pub fn apply(
    nest: &Nest,
    site: &ReadSite,
    directive: &ScatterBufferDirective,
    names: &mut NameGen,
) -> Result<ScatterResult, Diagnostic> {
    let loc = Loc::func(&nest.name);
    let scatter_var = directive
        .scatter_loop
        .as_deref()
        .expect("scatter synthesis requires a scatter loop");
    let (pos, sl) = check::find_loop(&site.loops, scatter_var, &loc)?;
    let (min, extent) = check::require_unrolled_const(sl, &loc)?;

    let reg_name = names.fresh(&format!("{}_scatter_shreg", directive.producer));
    let target_var = names.fresh(&format!("{}_scatter", scatter_var));

    // Chain register: one slot per PE of every unrolled loop enclosing the
    // scatter loop, plus the scatter dimension itself.
    let above = &site.loops[..pos];
    let above_unrolled: Vec<&LoopInfo> = above
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

    let boundary = match directive.strategy {
        Strategy::Up => min,
        Strategy::Down => min + extent - 1,
    };

    // Injection: the boundary PE reads the element destined for the current
    // target, under the site's own condition retargeted the same way.
    let at_target = |e: &Expr| expr::substitute(scatter_var, &Expr::var(target_var.clone()), e);
    let injected = Stmt::write(reg_name.clone(), slot(Expr::int(boundary)), at_target(&site.read));
    let inject_cond = expr::simplify(&at_target(&site.condition));
    let inject = match inject_cond {
        Expr::BoolConst(true) => injected,
        cond => Stmt::if_(cond, injected),
    };

    // Neighbor copies follow the injection outward from the boundary; each
    // copy reads the slot its neighbor wrote this cycle, so the target's
    // element reaches every slot before the consume loop runs.
    let mut moves = vec![inject];
    match directive.strategy {
        Strategy::Up => {
            for i in (min + 1)..(min + extent) {
                moves.push(Stmt::write(
                    reg_name.clone(),
                    slot(Expr::int(i)),
                    Expr::read(reg_name.clone(), slot(Expr::int(i - 1))),
                ));
            }
        }
        Strategy::Down => {
            for i in (min..(min + extent - 1)).rev() {
                moves.push(Stmt::write(
                    reg_name.clone(),
                    slot(Expr::int(i)),
                    Expr::read(reg_name.clone(), slot(Expr::int(i + 1))),
                ));
            }
        }
    }
    let chain = Stmt::seq(moves);

    // The original scatter loop survives as the consume loop: each PE runs
    // the original body on its own target cycle, reading the chain.
    let local = Expr::read(reg_name.clone(), slot(Expr::var(scatter_var)));
    let below = loop_body(&nest.body, scatter_var, &loc)?;
    let consumed = crate::ir::replace_expr(&site.read, &local, &below);
    let consume = Stmt::loop_(
        scatter_var,
        Expr::int(min),
        Expr::int(extent),
        LoopKind::Unrolled,
        Stmt::if_(
            Expr::var(scatter_var).eq(Expr::var(target_var.clone())),
            consumed,
        ),
    );

    let clocked = Stmt::loop_(
        target_var,
        Expr::int(min),
        Expr::int(extent),
        LoopKind::Serial,
        Stmt::seq(vec![chain, consume]),
    );
    let replacement = Stmt::alloc(reg_name.clone(), dims, clocked);
    let body = replace_loop(&nest.body, scatter_var, replacement);

    Ok(ScatterResult {
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

// ── Spine surgery ────────────────────────────────────────────────────────

/// The body of the named loop on the nest's spine.
pub(crate) fn loop_body(stmt: &Stmt, var: &str, loc: &Loc) -> Result<Stmt, Diagnostic> {
    match stmt {
        Stmt::Loop { var: v, body, .. } if v == var => Ok((**body).clone()),
        Stmt::Loop { body, .. } | Stmt::Let { body, .. } | Stmt::Alloc { body, .. } => {
            loop_body(body, var, loc)
        }
        _ => Err(Diagnostic::error(
            Loc::in_loop(loc.func.clone(), var),
            format!("loop {} is not on the nest's loop spine", var),
        )
        .with_code(codes::SCHEMA_ERROR)),
    }
}

/// Replace the named spine loop (and everything below it) with `with`.
pub(crate) fn replace_loop(stmt: &Stmt, var: &str, with: Stmt) -> Stmt {
    match stmt {
        Stmt::Loop { var: v, .. } if v == var => with,
        Stmt::Loop {
            var: v,
            min,
            extent,
            kind,
            body,
        } => Stmt::Loop {
            var: v.clone(),
            min: min.clone(),
            extent: extent.clone(),
            kind: *kind,
            body: Box::new(replace_loop(body, var, with)),
        },
        Stmt::Let { name, value, body } => Stmt::Let {
            name: name.clone(),
            value: value.clone(),
            body: Box::new(replace_loop(body, var, with)),
        },
        Stmt::Alloc { name, dims, body } => Stmt::Alloc {
            name: name.clone(),
            dims: dims.clone(),
            body: Box::new(replace_loop(body, var, with)),
        },
        other => other.clone(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
