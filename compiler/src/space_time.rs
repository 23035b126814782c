// space_time.rs — Affine space-time transform of a recurrence nest
//
// Rewrites the innermost loops of a recurrence nest (the declared source
// variables) into unrolled space loops plus one serial time loop, per the
// nest's affine transform. References to recurrence arrays become shift
// register accesses whose slot is the reference's time distance under the
// schedule; source variables are reconstructed from destination
// coordinates by reverse-map lets, and the body is guarded so destination
// points outside the image of the source box do nothing.
//
// Preconditions: the transform descriptor passed `validate`; the nest's
//   writes are in pure recurrence form (indices are plain loop variables).
// Postconditions: the returned nest iterates only destination coordinates
//   inside the transformed loops; every recurrence-array access goes
//   through a temp or shift register.
// Failure modes: `SchemaError` for mismatched loop prefixes, non-constant
//   or negative dependence distances, and malformed writes;
//   `NonInvertibleTransform` from reverse-map derivation.
// Side effects: none.

use std::collections::BTreeMap;

use crate::bounds::box_image;
use crate::diag::{codes, Diagnostic, Loc};
use crate::expr::{self, Expr};
use crate::ir::{self, Dim, LoopKind, Nest, Stmt};
use crate::schedule::AffineTransform;
use crate::shift_reg::{ShiftRegPlan, ShiftRegister};

// ── Result ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SpaceTimeResult {
    pub nest: Nest,
    pub registers: Vec<ShiftRegister>,
}

// ── Entry point ──────────────────────────────────────────────────────────

pub fn apply(nest: &Nest, xform: &AffineTransform) -> Result<SpaceTimeResult, Diagnostic> {
    let loc = Loc::func(&nest.name);
    xform.validate(&loc)?;

    let spine = ir::loop_spine(&nest.body);
    let body = ir::spine_body(&nest.body).clone();
    let n = xform.src_vars.len();
    if spine.len() < n {
        return Err(Diagnostic::error(
            loc.clone(),
            format!(
                "transform names {} source variables but the nest has {} loops",
                n,
                spine.len()
            ),
        )
        .with_code(codes::SCHEMA_ERROR));
    }

    // Innermost-first view of the spine; the source variables must be its
    // contiguous prefix, in order.
    let inner: Vec<_> = spine.iter().rev().collect();
    for (j, src) in xform.src_vars.iter().enumerate() {
        if &inner[j].var != src {
            return Err(Diagnostic::error(
                Loc::in_loop(&nest.name, src.clone()),
                format!(
                    "source variable {} is not loop {} counted from the innermost (found {})",
                    src, j, inner[j].var
                ),
            )
            .with_code(codes::SCHEMA_ERROR)
            .with_hint("space variables must be the innermost contiguous loops, then time"));
        }
    }
    let outer: Vec<_> = spine[..spine.len() - n].to_vec();
    let src_mins: Vec<Expr> = inner[..n].iter().map(|l| l.min.clone()).collect();
    let src_extents: Vec<Expr> = inner[..n].iter().map(|l| l.extent.clone()).collect();

    let ctx = Ctx {
        loc: loc.clone(),
        xform,
        write_vars: collect_write_vars(&nest.name, &body, &loc)?,
        num_space: xform.num_space(),
    };

    // Destination loop bounds: exact image of the source box under each
    // row, space rows first, schedule row last.
    let mut dst_dims = Vec::new();
    for row in 0..=ctx.num_space {
        let coeffs: Vec<i64> = (0..n).map(|col| xform.coefficient(row, col)).collect();
        let (min, extent) = box_image(&coeffs, &src_mins, &src_extents);
        dst_dims.push(Dim::new(min, extent));
    }
    let space_dims: Vec<Dim> = dst_dims[..ctx.num_space].to_vec();

    // Size registers from every recurrence-array reference.
    let mut plan = ShiftRegPlan::new();
    for array in ctx.write_vars.keys() {
        plan.declare(array, space_dims.clone());
    }
    let mut first_err = None;
    ir::visit_exprs(&body, &mut |e| {
        expr::visit(e, &mut |node| {
            if let Expr::Read { array, indices } = node {
                if ctx.write_vars.contains_key(array) && first_err.is_none() {
                    match ctx.reference_offsets(array, indices) {
                        Ok(offs) => plan.record(array, offs.distance),
                        Err(d) => first_err = Some(d),
                    }
                }
            }
        });
    });
    if let Some(d) = first_err {
        return Err(d);
    }
    let registers = plan.finalize();
    let by_array: BTreeMap<&str, &ShiftRegister> =
        registers.iter().map(|r| (r.array.as_str(), r)).collect();

    // Rewrite writes to land in temps, then every recurrence-array read.
    let mut first_err = None;
    let renamed = rewrite_writes(&body, &ctx, &by_array);
    let rewritten = ir::map_exprs(&renamed, &mut |e| {
        rewrite_expr(e, &ctx, &by_array, &mut first_err)
    });
    if let Some(d) = first_err {
        return Err(d);
    }

    // Reverse lets and the source-box guard. Identity bindings (the
    // unscheduled transform) emit no lets.
    let reverse: Vec<(String, Expr)> = xform
        .reverse_map(&loc)?
        .into_iter()
        .filter(|(name, e)| *e != Expr::var(name.clone()))
        .collect();
    let mut guard = Expr::BoolConst(true);
    for (j, src) in xform.src_vars.iter().enumerate() {
        let v = Expr::var(src.clone());
        let lo = v.clone().ge(src_mins[j].clone());
        let hi = v.lt(src_mins[j].clone() + src_extents[j].clone());
        guard = guard.and(lo).and(hi);
    }
    let mut compute = Stmt::lets(reverse, Stmt::if_(expr::simplify(&guard), rewritten));
    for k in 0..ctx.num_space {
        compute = Stmt::loop_(
            xform.dst_vars[k].clone(),
            dst_dims[k].min.clone(),
            dst_dims[k].extent.clone(),
            LoopKind::Unrolled,
            compute,
        );
    }

    // Register advance: at the bottom of each clock every live register
    // shifts by one slot and absorbs the freshly computed value.
    let mut time_body = vec![compute];
    let advance = advance_block(&registers, xform, &dst_dims);
    if let Some(advance) = advance {
        time_body.push(advance);
    }
    let time_var = &xform.dst_vars[ctx.num_space];
    let mut out = Stmt::loop_(
        time_var.clone(),
        dst_dims[ctx.num_space].min.clone(),
        dst_dims[ctx.num_space].extent.clone(),
        LoopKind::Serial,
        Stmt::seq(time_body),
    );

    // Storage, innermost alloc first so declaration order is stable.
    for reg in registers.iter().rev() {
        if !reg.is_degenerate() {
            let mut dims = reg.space_dims.clone();
            dims.push(Dim::new(Expr::int(0), Expr::int(reg.depth())));
            out = Stmt::alloc(reg.reg_name.clone(), dims, out);
        }
        out = Stmt::alloc(reg.temp_name.clone(), reg.space_dims.clone(), out);
    }

    for l in outer.iter().rev() {
        out = Stmt::loop_(l.var.clone(), l.min.clone(), l.extent.clone(), l.kind, out);
    }

    Ok(SpaceTimeResult {
        nest: Nest {
            name: nest.name.clone(),
            body: ir::simplify(&out),
        },
        registers,
    })
}

// ── Context ──────────────────────────────────────────────────────────────

struct Ctx<'a> {
    loc: Loc,
    xform: &'a AffineTransform,
    /// Per recurrence array: the loop variables of its defining write, in
    /// index-position order.
    write_vars: BTreeMap<String, Vec<String>>,
    num_space: usize,
}

struct RefOffsets {
    /// Time distance under the schedule; constant and non-negative.
    distance: i64,
    /// Destination space indices of the referenced value.
    space_indices: Vec<Expr>,
}

impl Ctx<'_> {
    /// Offsets of one reference to recurrence array `array` relative to the
    /// defining write: `dst_k - Σ_j (src_j - arg_j) * coeff[k][j]` per
    /// space row, and the same sum over the schedule row as the distance.
    fn reference_offsets(&self, array: &str, indices: &[Expr]) -> Result<RefOffsets, Diagnostic> {
        let write_vars = &self.write_vars[array];
        if indices.len() != write_vars.len() {
            return Err(Diagnostic::error(
                self.loc.clone(),
                format!(
                    "reference to {} has {} indices but its definition has {}",
                    array,
                    indices.len(),
                    write_vars.len()
                ),
            )
            .with_code(codes::SCHEMA_ERROR));
        }
        // Per source variable: src_j - arg_j.
        let mut diffs = Vec::with_capacity(self.xform.src_vars.len());
        for src in &self.xform.src_vars {
            let pos = write_vars.iter().position(|v| v == src).ok_or_else(|| {
                Diagnostic::error(
                    self.loc.clone(),
                    format!("array {} is not indexed by source variable {}", array, src),
                )
                .with_code(codes::SCHEMA_ERROR)
            })?;
            diffs.push(expr::simplify(
                &(Expr::var(src.clone()) - indices[pos].clone()),
            ));
        }
        // Index positions outside the transform must be invariant.
        for (pos, wv) in write_vars.iter().enumerate() {
            if !self.xform.src_vars.contains(wv) && indices[pos] != Expr::var(wv.clone()) {
                return Err(Diagnostic::error(
                    Loc::in_loop(self.loc.func.clone(), wv.clone()),
                    format!(
                        "reference to {} varies in untransformed dimension {}",
                        array, wv
                    ),
                )
                .with_code(codes::SCHEMA_ERROR));
            }
        }

        let mut time = Expr::int(0);
        for (j, d) in diffs.iter().enumerate() {
            time = time + Expr::int(self.xform.sch_vector[j]) * d.clone();
        }
        let distance = expr::simplify(&time).as_const().ok_or_else(|| {
            Diagnostic::error(
                self.loc.clone(),
                format!("dependence distance of a reference to {} is not constant", array),
            )
            .with_code(codes::SCHEMA_ERROR)
        })?;
        if distance < 0 {
            return Err(Diagnostic::error(
                self.loc.clone(),
                format!(
                    "reference to {} has negative distance {} under this schedule",
                    array, distance
                ),
            )
            .with_code(codes::SCHEMA_ERROR)
            .with_hint("the schedule must order every producer before its consumers"));
        }

        let mut space_indices = Vec::with_capacity(self.num_space);
        for k in 0..self.num_space {
            let mut off = Expr::int(0);
            for (j, d) in diffs.iter().enumerate() {
                off = off + Expr::int(self.xform.proj_matrix[k][j]) * d.clone();
            }
            space_indices.push(expr::simplify(
                &(Expr::var(self.xform.dst_vars[k].clone()) - off),
            ));
        }
        Ok(RefOffsets {
            distance,
            space_indices,
        })
    }

    fn dst_space_vars(&self) -> Vec<Expr> {
        self.xform.dst_vars[..self.num_space]
            .iter()
            .map(|v| Expr::var(v.clone()))
            .collect()
    }
}

// ── Write collection ─────────────────────────────────────────────────────

/// Map each written array to the loop variables of its defining write.
/// Writes must be in pure recurrence form: every index a plain variable,
/// and all writes to one array index it identically.
fn collect_write_vars(
    nest_name: &str,
    body: &Stmt,
    loc: &Loc,
) -> Result<BTreeMap<String, Vec<String>>, Diagnostic> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut first_err = None;
    visit_writes(body, &mut |array, indices| {
        if first_err.is_some() {
            return;
        }
        let mut vars = Vec::with_capacity(indices.len());
        for idx in indices {
            match idx {
                Expr::Var(v) => vars.push(v.clone()),
                other => {
                    first_err = Some(
                        Diagnostic::error(
                            loc.clone(),
                            format!(
                                "write to {} in {} indexes with {} instead of a loop variable",
                                array, nest_name, other
                            ),
                        )
                        .with_code(codes::SCHEMA_ERROR),
                    );
                    return;
                }
            }
        }
        match out.get(array) {
            Some(prev) if prev != &vars => {
                first_err = Some(
                    Diagnostic::error(
                        loc.clone(),
                        format!("array {} is written with two different index orders", array),
                    )
                    .with_code(codes::SCHEMA_ERROR),
                );
            }
            _ => {
                out.insert(array.to_string(), vars);
            }
        }
    });
    match first_err {
        Some(d) => Err(d),
        None => Ok(out),
    }
}

fn visit_writes(stmt: &Stmt, f: &mut impl FnMut(&str, &[Expr])) {
    visit_writes_dyn(stmt, f)
}

fn visit_writes_dyn(stmt: &Stmt, f: &mut dyn FnMut(&str, &[Expr])) {
    match stmt {
        Stmt::Write { array, indices, .. } => f(array, indices),
        Stmt::Loop { body, .. } | Stmt::Let { body, .. } | Stmt::Alloc { body, .. } => {
            visit_writes_dyn(body, f)
        }
        Stmt::If { then_, else_, .. } => {
            visit_writes_dyn(then_, f);
            if let Some(e) = else_ {
                visit_writes_dyn(e, f);
            }
        }
        Stmt::Seq(stmts) => {
            for s in stmts {
                visit_writes_dyn(s, f);
            }
        }
    }
}

// ── Reference rewriting ──────────────────────────────────────────────────

/// Writes to recurrence arrays land in the temp at the PE's own
/// coordinates; the advance block moves them into the register. Reads are
/// left untouched here (one `map_exprs` pass handles them afterwards).
fn rewrite_writes(stmt: &Stmt, ctx: &Ctx<'_>, regs: &BTreeMap<&str, &ShiftRegister>) -> Stmt {
    match stmt {
        Stmt::Write { array, value, .. } if ctx.write_vars.contains_key(array) => Stmt::Write {
            array: regs[array.as_str()].temp_name.clone(),
            indices: ctx.dst_space_vars(),
            value: value.clone(),
        },
        Stmt::Loop {
            var,
            min,
            extent,
            kind,
            body,
        } => Stmt::Loop {
            var: var.clone(),
            min: min.clone(),
            extent: extent.clone(),
            kind: *kind,
            body: Box::new(rewrite_writes(body, ctx, regs)),
        },
        Stmt::If { cond, then_, else_ } => Stmt::If {
            cond: cond.clone(),
            then_: Box::new(rewrite_writes(then_, ctx, regs)),
            else_: else_.as_ref().map(|e| Box::new(rewrite_writes(e, ctx, regs))),
        },
        Stmt::Seq(stmts) => {
            Stmt::Seq(stmts.iter().map(|s| rewrite_writes(s, ctx, regs)).collect())
        }
        Stmt::Let { name, value, body } => Stmt::Let {
            name: name.clone(),
            value: value.clone(),
            body: Box::new(rewrite_writes(body, ctx, regs)),
        },
        Stmt::Alloc { name, dims, body } => Stmt::Alloc {
            name: name.clone(),
            dims: dims.clone(),
            body: Box::new(rewrite_writes(body, ctx, regs)),
        },
        other => other.clone(),
    }
}

fn rewrite_expr(
    e: &Expr,
    ctx: &Ctx<'_>,
    regs: &BTreeMap<&str, &ShiftRegister>,
    first_err: &mut Option<Diagnostic>,
) -> Expr {
    expr::transform(e, &mut |node| {
        let Expr::Read { array, indices } = node else {
            return None;
        };
        if !ctx.write_vars.contains_key(array) {
            return None;
        }
        let reg = regs[array.as_str()];
        match ctx.reference_offsets(array, indices) {
            Ok(offs) => {
                // Distance zero reads the value produced this clock; any
                // other distance reads slot d-1, where the value written d
                // clocks ago sits after d-1 advances.
                if offs.distance == 0 {
                    Some(Expr::read(reg.temp_name.clone(), offs.space_indices))
                } else {
                    let mut idx = offs.space_indices;
                    idx.push(Expr::int(offs.distance - 1));
                    Some(Expr::read(reg.reg_name.clone(), idx))
                }
            }
            Err(d) => {
                if first_err.is_none() {
                    *first_err = Some(d);
                }
                Some(node.clone())
            }
        }
    })
}

// ── Register advance ─────────────────────────────────────────────────────

/// Unrolled space loops shifting every non-degenerate register by one slot
/// and loading the temp into slot zero. Slots are written deepest-first so
/// each clock moves values exactly one slot.
fn advance_block(
    registers: &[ShiftRegister],
    xform: &AffineTransform,
    dst_dims: &[Dim],
) -> Option<Stmt> {
    let live: Vec<_> = registers.iter().filter(|r| !r.is_degenerate()).collect();
    if live.is_empty() {
        return None;
    }
    let space: Vec<Expr> = xform.dst_vars[..xform.num_space()]
        .iter()
        .map(|v| Expr::var(v.clone()))
        .collect();
    let mut stmts = Vec::new();
    for reg in live {
        for p in (1..reg.depth()).rev() {
            let mut dst = space.clone();
            dst.push(Expr::int(p));
            let mut src = space.clone();
            src.push(Expr::int(p - 1));
            stmts.push(Stmt::write(
                reg.reg_name.clone(),
                dst,
                Expr::read(reg.reg_name.clone(), src),
            ));
        }
        let mut dst = space.clone();
        dst.push(Expr::int(0));
        stmts.push(Stmt::write(
            reg.reg_name.clone(),
            dst,
            Expr::read(reg.temp_name.clone(), space.clone()),
        ));
    }
    let mut block = Stmt::seq(stmts);
    for k in 0..xform.num_space() {
        block = Stmt::loop_(
            xform.dst_vars[k].clone(),
            dst_dims[k].min.clone(),
            dst_dims[k].extent.clone(),
            LoopKind::Unrolled,
            block,
        );
    }
    Some(block)
}

// ── Tests ────────────────────────────────────────────────────────────────
