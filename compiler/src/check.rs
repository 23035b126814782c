// check.rs — Semantic checks shared by scatter, buffer, and gather synthesis
//
// Locates the unique read of a producer array inside a consumer nest,
// recording the enclosing loops and the And-folded path condition along the
// way, and validates the preconditions the synthesis passes rely on:
// exactly one read site, a supported path condition, and constant bounds on
// the loops the generated controllers must enumerate.
//
// Preconditions: none.
// Postconditions: a returned `ReadSite` is the only reference to the
//   producer in the consumer, and its condition is a conjunction of
//   comparisons.
// Failure modes: `AmbiguousReference`, `UnsupportedConditionError`,
//   `NonConstantBoundError`, `SchemaError`.
// Side effects: none.

use crate::diag::{codes, Diagnostic, Loc};
use crate::expr::{self, Expr};
use crate::ir::{LoopInfo, LoopKind, Nest, Stmt};

// ── Read site ────────────────────────────────────────────────────────────

/// The unique reference to a producer array inside a consumer nest.
#[derive(Debug, Clone)]
pub struct ReadSite {
    /// The `Read` node exactly as it appears in the consumer.
    pub read: Expr,
    /// Conjunction of every `If` and `Select` condition on the path to the
    /// read, simplified.
    pub condition: Expr,
    /// Enclosing loops, outermost first.
    pub loops: Vec<LoopInfo>,
}

// ── Site location ────────────────────────────────────────────────────────

pub fn locate_read(nest: &Nest, producer: &str) -> Result<ReadSite, Diagnostic> {
    let loc = Loc::func(&nest.name);
    let mut found: Option<ReadSite> = None;
    let mut first_err: Option<Diagnostic> = None;
    let mut loops = Vec::new();
    walk(
        &nest.body,
        &Expr::BoolConst(true),
        &mut loops,
        &mut |read, cond, loops| {
            if first_err.is_some() {
                return;
            }
            if found.is_some() {
                first_err = Some(
                    Diagnostic::error(
                        loc.clone(),
                        format!("{} is referenced more than once in {}", producer, nest.name),
                    )
                    .with_code(codes::AMBIGUOUS_REFERENCE)
                    .with_hint("isolate each reference into its own function"),
                );
                return;
            }
            found = Some(ReadSite {
                read: read.clone(),
                condition: expr::simplify(cond),
                loops: loops.to_vec(),
            });
        },
        producer,
    );
    if let Some(d) = first_err {
        return Err(d);
    }
    let site = found.ok_or_else(|| {
        Diagnostic::error(
            loc.clone(),
            format!("{} never reads {}", nest.name, producer),
        )
        .with_code(codes::SCHEMA_ERROR)
    })?;
    ensure_supported_condition(&site.condition, &loc)?;
    Ok(site)
}

fn walk(
    stmt: &Stmt,
    cond: &Expr,
    loops: &mut Vec<LoopInfo>,
    f: &mut impl FnMut(&Expr, &Expr, &[LoopInfo]),
    producer: &str,
) {
    walk_dyn(stmt, cond, loops, f, producer)
}

fn walk_dyn(
    stmt: &Stmt,
    cond: &Expr,
    loops: &mut Vec<LoopInfo>,
    f: &mut dyn FnMut(&Expr, &Expr, &[LoopInfo]),
    producer: &str,
) {
    match stmt {
        Stmt::Loop {
            var,
            min,
            extent,
            kind,
            body,
        } => {
            loops.push(LoopInfo {
                var: var.clone(),
                min: min.clone(),
                extent: extent.clone(),
                kind: *kind,
            });
            walk_dyn(body, cond, loops, f, producer);
            loops.pop();
        }
        Stmt::Write { indices, value, .. } => {
            for i in indices {
                walk_expr(i, cond, loops, f, producer);
            }
            walk_expr(value, cond, loops, f, producer);
        }
        Stmt::If {
            cond: c,
            then_,
            else_,
        } => {
            walk_expr(c, cond, loops, f, producer);
            let then_cond = expr::simplify(&cond.clone().and(c.clone()));
            walk_dyn(then_, &then_cond, loops, f, producer);
            if let Some(e) = else_ {
                let else_cond = expr::simplify(&cond.clone().and(c.clone().not()));
                walk_dyn(e, &else_cond, loops, f, producer);
            }
        }
        Stmt::Seq(stmts) => {
            for s in stmts {
                walk_dyn(s, cond, loops, f, producer);
            }
        }
        Stmt::Let { value, body, .. } => {
            walk_expr(value, cond, loops, f, producer);
            walk_dyn(body, cond, loops, f, producer);
        }
        Stmt::Alloc { body, .. } => walk_dyn(body, cond, loops, f, producer),
    }
}

fn walk_expr(
    e: &Expr,
    cond: &Expr,
    loops: &[LoopInfo],
    f: &mut dyn FnMut(&Expr, &Expr, &[LoopInfo]),
    producer: &str,
) {
    match e {
        Expr::Read { array, indices } => {
            if array == producer {
                f(e, cond, loops);
            }
            for i in indices {
                walk_expr(i, cond, loops, f, producer);
            }
        }
        Expr::Select { cond: c, then_, else_ } => {
            walk_expr(c, cond, loops, f, producer);
            let then_cond = expr::simplify(&cond.clone().and((**c).clone()));
            walk_expr(then_, &then_cond, loops, f, producer);
            let else_cond = expr::simplify(&cond.clone().and((**c).clone().not()));
            walk_expr(else_, &else_cond, loops, f, producer);
        }
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_) => {}
        Expr::Add(a, b)
        | Expr::Sub(a, b)
        | Expr::Mul(a, b)
        | Expr::Div(a, b)
        | Expr::Mod(a, b)
        | Expr::Min(a, b)
        | Expr::Max(a, b)
        | Expr::Eq(a, b)
        | Expr::Ne(a, b)
        | Expr::Lt(a, b)
        | Expr::Le(a, b)
        | Expr::Gt(a, b)
        | Expr::Ge(a, b)
        | Expr::And(a, b)
        | Expr::Or(a, b) => {
            walk_expr(a, cond, loops, f, producer);
            walk_expr(b, cond, loops, f, producer);
        }
        Expr::Not(a) => walk_expr(a, cond, loops, f, producer),
    }
}

// ── Condition support ────────────────────────────────────────────────────

/// The synthesized controllers can only reproduce conditions that are
/// conjunctions of comparisons over loop variables and constants.
pub fn ensure_supported_condition(cond: &Expr, loc: &Loc) -> Result<(), Diagnostic> {
    if is_conjunction_of_comparisons(cond) {
        Ok(())
    } else {
        Err(Diagnostic::error(
            loc.clone(),
            format!("unsupported path condition: {}", cond),
        )
        .with_code(codes::UNSUPPORTED_CONDITION)
        .with_hint("guard the reference with a conjunction of comparisons over loop variables"))
    }
}

fn is_conjunction_of_comparisons(cond: &Expr) -> bool {
    match cond {
        Expr::BoolConst(_) => true,
        Expr::And(a, b) => is_conjunction_of_comparisons(a) && is_conjunction_of_comparisons(b),
        Expr::Eq(a, b)
        | Expr::Ne(a, b)
        | Expr::Lt(a, b)
        | Expr::Le(a, b)
        | Expr::Gt(a, b)
        | Expr::Ge(a, b) => is_scalar_term(a) && is_scalar_term(b),
        _ => false,
    }
}

fn is_scalar_term(e: &Expr) -> bool {
    let mut ok = true;
    expr::visit(e, &mut |node| match node {
        Expr::Read { .. } | Expr::Select { .. } | Expr::BoolConst(_) => ok = false,
        _ => {}
    });
    ok
}

// ── Loop lookups ─────────────────────────────────────────────────────────

/// Find a named loop among a site's enclosing loops.
pub fn find_loop<'a>(
    loops: &'a [LoopInfo],
    name: &str,
    loc: &Loc,
) -> Result<(usize, &'a LoopInfo), Diagnostic> {
    loops
        .iter()
        .enumerate()
        .find(|(_, l)| l.var == name)
        .ok_or_else(|| {
            Diagnostic::error(
                loc.clone(),
                format!("loop {} does not enclose the reference", name),
            )
            .with_code(codes::SCHEMA_ERROR)
        })
}

/// Constant `(min, extent)` of a loop, or `NonConstantBoundError`.
pub fn const_bounds(l: &LoopInfo, loc: &Loc) -> Result<(i64, i64), Diagnostic> {
    let min = expr::simplify(&l.min).as_const();
    let extent = expr::simplify(&l.extent).as_const();
    match (min, extent) {
        (Some(m), Some(e)) => Ok((m, e)),
        _ => Err(Diagnostic::error(
            Loc::in_loop(loc.func.clone(), l.var.clone()),
            format!("loop {} must have constant bounds", l.var),
        )
        .with_code(codes::NON_CONSTANT_BOUND)),
    }
}

/// A scatter or gather loop must be unrolled with constant bounds.
pub fn require_unrolled_const(l: &LoopInfo, loc: &Loc) -> Result<(i64, i64), Diagnostic> {
    if l.kind != LoopKind::Unrolled {
        return Err(Diagnostic::error(
            Loc::in_loop(loc.func.clone(), l.var.clone()),
            format!("loop {} must be unrolled to form a chain", l.var),
        )
        .with_code(codes::SCHEMA_ERROR));
    }
    const_bounds(l, loc)
}

// ── Tests ────────────────────────────────────────────────────────────────
