// schedule.rs — Transform descriptors: space-time maps and data-path directives
//
// The schedule is supplied alongside the program: per recurrence function an
// optional affine space-time transform, plus scatter/buffer and gather
// directives naming producer/consumer pairs. Descriptor shape is validated
// here; semantic checks that need the IR (read-site uniqueness, constant
// bounds) live in `check`.
//
// Preconditions: none.
// Postconditions: a descriptor that passes `validate` has consistent
//   dimensions and derivable (or supplied) reverse maps.
// Failure modes: `SchemaError` for malformed descriptors,
//   `NonInvertibleTransform` when no integer reverse map exists.
// Side effects: none.

use std::collections::BTreeMap;

use crate::diag::{codes, Diagnostic, Loc};
use crate::expr::{simplify, Expr};
use crate::matrix;

// ── Affine space-time transform ──────────────────────────────────────────

/// An affine map from source iteration variables to space coordinates plus
/// one time coordinate.
///
/// `src_vars` lists the transformed loop variables innermost-first; the
/// space variables must form the innermost contiguous prefix of the
/// recurrence's loop order, followed by the time variable. `proj_matrix`
/// has one row per destination space coordinate; `sch_vector` is the time
/// row. `dst_vars` names the destination coordinates, space first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineTransform {
    pub src_vars: Vec<String>,
    pub dst_vars: Vec<String>,
    pub proj_matrix: Vec<Vec<i64>>,
    pub sch_vector: Vec<i64>,
    /// Reverse map: source var, reconstructed from destination vars.
    /// Empty means "derive by matrix inversion".
    pub reverse: Vec<(String, Expr)>,
}

impl AffineTransform {
    pub fn new(
        src_vars: Vec<&str>,
        dst_vars: Vec<&str>,
        proj_matrix: Vec<Vec<i64>>,
        sch_vector: Vec<i64>,
    ) -> Self {
        Self {
            src_vars: src_vars.into_iter().map(String::from).collect(),
            dst_vars: dst_vars.into_iter().map(String::from).collect(),
            proj_matrix,
            sch_vector,
            reverse: Vec::new(),
        }
    }

    /// The unscheduled transform: every named space variable keeps its own
    /// coordinate under an identity projection, the remaining loop becomes
    /// the time coordinate with a unit schedule, and the reverse map is the
    /// identity. `space_vars` innermost-first, as in the scheduled form.
    pub fn unscheduled(space_vars: Vec<&str>, time_var: &str) -> Self {
        let n = space_vars.len() + 1;
        let mut proj = vec![vec![0i64; n]; n - 1];
        for (k, row) in proj.iter_mut().enumerate() {
            row[k] = 1;
        }
        let mut sch = vec![0i64; n];
        sch[n - 1] = 1;
        let mut vars: Vec<String> = space_vars.into_iter().map(String::from).collect();
        vars.push(time_var.to_string());
        let reverse = vars.iter().map(|v| (v.clone(), Expr::var(v.clone()))).collect();
        Self {
            src_vars: vars.clone(),
            dst_vars: vars,
            proj_matrix: proj,
            sch_vector: sch,
            reverse,
        }
    }

    /// Supply an explicit reverse map instead of deriving one.
    pub fn with_reverse(mut self, reverse: Vec<(&str, Expr)>) -> Self {
        self.reverse = reverse
            .into_iter()
            .map(|(n, e)| (n.to_string(), e))
            .collect();
        self
    }

    /// Number of destination space coordinates.
    pub fn num_space(&self) -> usize {
        self.proj_matrix.len()
    }

    /// Coefficient of destination row `row` (space rows first, time row
    /// last) for source column `col`.
    pub fn coefficient(&self, row: usize, col: usize) -> i64 {
        if row < self.proj_matrix.len() {
            self.proj_matrix[row][col]
        } else {
            self.sch_vector[col]
        }
    }

    /// Projection rows stacked over the schedule row.
    pub fn stacked(&self) -> Vec<Vec<i64>> {
        let mut rows = self.proj_matrix.clone();
        rows.push(self.sch_vector.clone());
        rows
    }

    /// Dimension checks only; does not touch the IR.
    pub fn validate(&self, loc: &Loc) -> Result<(), Diagnostic> {
        let n = self.src_vars.len();
        if n == 0 {
            return Err(Diagnostic::error(loc.clone(), "transform has no source variables")
                .with_code(codes::SCHEMA_ERROR));
        }
        if self.sch_vector.len() != n {
            return Err(Diagnostic::error(
                loc.clone(),
                format!(
                    "schedule vector has {} coefficients for {} source variables",
                    self.sch_vector.len(),
                    n
                ),
            )
            .with_code(codes::SCHEMA_ERROR));
        }
        for (i, row) in self.proj_matrix.iter().enumerate() {
            if row.len() != n {
                return Err(Diagnostic::error(
                    loc.clone(),
                    format!(
                        "projection row {} has {} coefficients for {} source variables",
                        i,
                        row.len(),
                        n
                    ),
                )
                .with_code(codes::SCHEMA_ERROR));
            }
        }
        if self.dst_vars.len() != self.proj_matrix.len() + 1 {
            return Err(Diagnostic::error(
                loc.clone(),
                format!(
                    "{} destination names for {} space rows plus time",
                    self.dst_vars.len(),
                    self.proj_matrix.len()
                ),
            )
            .with_code(codes::SCHEMA_ERROR));
        }
        if !self.reverse.is_empty() && self.reverse.len() != n {
            return Err(Diagnostic::error(
                loc.clone(),
                format!(
                    "reverse map reconstructs {} of {} source variables",
                    self.reverse.len(),
                    n
                ),
            )
            .with_code(codes::SCHEMA_ERROR));
        }
        Ok(())
    }

    /// The reverse map: the supplied one if present, otherwise derived by
    /// inverting the stacked matrix. Derivation requires the stacked matrix
    /// to be square (one space row fewer than source variables) and
    /// integrally invertible.
    pub fn reverse_map(&self, loc: &Loc) -> Result<Vec<(String, Expr)>, Diagnostic> {
        if !self.reverse.is_empty() {
            return Ok(self.reverse.clone());
        }
        let stacked = self.stacked();
        if stacked.len() != self.src_vars.len() {
            return Err(Diagnostic::error(
                loc.clone(),
                format!(
                    "cannot derive a reverse map: {} destination rows for {} source variables",
                    stacked.len(),
                    self.src_vars.len()
                ),
            )
            .with_code(codes::NON_INVERTIBLE_TRANSFORM)
            .with_hint("supply an explicit reverse map"));
        }
        let inv = matrix::inverse(&stacked).ok_or_else(|| {
            Diagnostic::error(
                loc.clone(),
                "projection and schedule matrix has no integer inverse",
            )
            .with_code(codes::NON_INVERTIBLE_TRANSFORM)
            .with_hint("supply an explicit reverse map")
        })?;
        let map = self
            .src_vars
            .iter()
            .enumerate()
            .map(|(j, src)| {
                let mut e = Expr::int(0);
                for (k, dst) in self.dst_vars.iter().enumerate() {
                    e = e + Expr::int(inv[j][k]) * Expr::var(dst.clone());
                }
                (src.clone(), simplify(&e))
            })
            .collect();
        Ok(map)
    }
}

// ── Scatter / buffer / gather directives ─────────────────────────────────

/// Direction a scatter or gather chain moves data: `Up` toward higher PE
/// indices, `Down` toward lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Strategy {
    Up,
    Down,
}

/// Scatter and/or double-buffer the values a consumer reads from
/// `producer`. At least one of `scatter_loop`/`buffer_loop` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatterBufferDirective {
    pub consumer: String,
    pub producer: String,
    /// Unrolled loop whose iterations become the scatter chain.
    pub scatter_loop: Option<String>,
    /// Loop level at which the double buffer sits.
    pub buffer_loop: Option<String>,
    pub strategy: Strategy,
    /// Consumer loops the producer does not iterate (its stream carries one
    /// value for all their iterations).
    pub removed_in_producer: Vec<String>,
}

/// Collect per-PE results from `producer` into the sequential stream the
/// consumer writes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherDirective {
    pub consumer: String,
    pub producer: String,
    /// Unrolled loop whose iterations form the collection chain.
    pub gather_loop: String,
    pub strategy: Strategy,
}

impl ScatterBufferDirective {
    pub fn validate(&self) -> Result<(), Diagnostic> {
        if self.scatter_loop.is_none() && self.buffer_loop.is_none() {
            return Err(Diagnostic::error(
                Loc::func(&self.consumer),
                format!(
                    "directive for producer {} names neither a scatter loop nor a buffer loop",
                    self.producer
                ),
            )
            .with_code(codes::SCHEMA_ERROR));
        }
        Ok(())
    }
}

// ── Schedule container ───────────────────────────────────────────────────

/// Everything the pipeline needs besides the program itself.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Space-time transform per recurrence function, keyed by nest name.
    pub transforms: BTreeMap<String, AffineTransform>,
    pub scatter_buffer: Vec<ScatterBufferDirective>,
    pub gather: Vec<GatherDirective>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, nest: &str, t: AffineTransform) -> Self {
        self.transforms.insert(nest.to_string(), t);
        self
    }

    pub fn with_scatter_buffer(mut self, d: ScatterBufferDirective) -> Self {
        self.scatter_buffer.push(d);
        self
    }

    pub fn with_gather(mut self, d: GatherDirective) -> Self {
        self.gather.push(d);
        self
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wavefront() -> AffineTransform {
        // 2-D wavefront: space = j, time = i + j.
        AffineTransform::new(vec!["j", "i"], vec!["s", "t"], vec![vec![1, 0]], vec![1, 1])
    }

    #[test]
    fn validate_accepts_wavefront() {
        assert!(wavefront().validate(&Loc::func("C")).is_ok());
    }

    #[test]
    fn validate_rejects_short_schedule_vector() {
        let mut t = wavefront();
        t.sch_vector = vec![1];
        let err = t.validate(&Loc::func("C")).unwrap_err();
        assert_eq!(err.code, Some(codes::SCHEMA_ERROR));
    }

    #[test]
    fn unscheduled_transform_is_the_identity() {
        let t = AffineTransform::unscheduled(vec!["j"], "i");
        t.validate(&Loc::func("C")).unwrap();
        assert_eq!(t.stacked(), crate::matrix::identity(2));
        assert_eq!(t.src_vars, t.dst_vars);
        let map = t.reverse_map(&Loc::func("C")).unwrap();
        assert_eq!(map[0], ("j".to_string(), Expr::var("j")));
        assert_eq!(map[1], ("i".to_string(), Expr::var("i")));
    }

    #[test]
    fn derived_reverse_map_inverts_wavefront() {
        // [s; t] = [[1,0],[1,1]] [j; i]  =>  j = s, i = t - s.
        let map = wavefront().reverse_map(&Loc::func("C")).unwrap();
        assert_eq!(map[0], ("j".to_string(), Expr::var("s")));
        assert_eq!(
            map[1],
            ("i".to_string(), Expr::var("s") * Expr::int(-1) + Expr::var("t"))
        );
    }

    #[test]
    fn singular_transform_reports_non_invertible() {
        let t = AffineTransform::new(
            vec!["j", "i"],
            vec!["s", "t"],
            vec![vec![1, 1]],
            vec![1, 1],
        );
        let err = t.reverse_map(&Loc::func("C")).unwrap_err();
        assert_eq!(err.code, Some(codes::NON_INVERTIBLE_TRANSFORM));
    }

    #[test]
    fn explicit_reverse_map_wins() {
        let t = AffineTransform::new(
            vec!["j", "i"],
            vec!["s", "t"],
            vec![vec![1, 1]],
            vec![1, 1],
        )
        .with_reverse(vec![("j", Expr::var("s")), ("i", Expr::var("t"))]);
        let map = t.reverse_map(&Loc::func("C")).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].0, "j");
    }

    #[test]
    fn directive_needs_a_loop() {
        let d = ScatterBufferDirective {
            consumer: "C".into(),
            producer: "A".into(),
            scatter_loop: None,
            buffer_loop: None,
            strategy: Strategy::Up,
            removed_in_producer: vec![],
        };
        assert_eq!(d.validate().unwrap_err().code, Some(codes::SCHEMA_ERROR));
    }
}
