// interp.rs — Reference interpreter for loop-nest IR
//
// Executes a nest sequentially, unrolled loops included, over sparse
// integer arrays. Exists so tests can compare a transformed nest against
// the original on concrete data and observe write order; it is not a
// performance model.
//
// Allocated storage reads as zero before the first write, matching
// registers that power up cleared. Booleans are 0/1.
//
// Preconditions: loop and let variable names are unique within a nest.
// Postconditions: array contents reflect every executed write, in order.
// Failure modes: diagnostics for unbound variables, unknown arrays, and
//   division by zero.
// Side effects: none beyond the interpreter's own state.

use std::collections::BTreeMap;

use crate::diag::{Diagnostic, Loc};
use crate::expr::Expr;
use crate::ir::{Nest, Program, Stmt};

pub type ArrayStore = BTreeMap<Vec<i64>, i64>;

#[derive(Debug, Default)]
pub struct Interp {
    arrays: BTreeMap<String, ArrayStore>,
    scalars: BTreeMap<String, i64>,
    func: String,
}

impl Interp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload one element of an input array.
    pub fn set(&mut self, array: &str, indices: Vec<i64>, value: i64) {
        self.arrays
            .entry(array.to_string())
            .or_default()
            .insert(indices, value);
    }

    /// Declare an input array with no preloaded elements.
    pub fn declare(&mut self, array: &str) {
        self.arrays.entry(array.to_string()).or_default();
    }

    pub fn get(&self, array: &str, indices: &[i64]) -> Option<i64> {
        self.arrays.get(array)?.get(indices).copied()
    }

    pub fn array(&self, array: &str) -> Option<&ArrayStore> {
        self.arrays.get(array)
    }

    pub fn run_nest(&mut self, nest: &Nest) -> Result<(), Diagnostic> {
        self.run_nest_observed(nest, &mut |_, _, _| {})
    }

    /// Run a nest, calling `observer` with (array, indices, value) for every
    /// write in execution order.
    pub fn run_nest_observed(
        &mut self,
        nest: &Nest,
        observer: &mut dyn FnMut(&str, &[i64], i64),
    ) -> Result<(), Diagnostic> {
        self.func = nest.name.clone();
        self.arrays.entry(nest.name.clone()).or_default();
        self.exec(&nest.body, observer)
    }

    pub fn run_program(&mut self, program: &Program) -> Result<(), Diagnostic> {
        for nest in &program.nests {
            self.run_nest(nest)?;
        }
        Ok(())
    }

    fn err(&self, message: String) -> Diagnostic {
        Diagnostic::error(Loc::func(&self.func), message)
    }

    fn exec(
        &mut self,
        stmt: &Stmt,
        observer: &mut dyn FnMut(&str, &[i64], i64),
    ) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::Loop {
                var,
                min,
                extent,
                body,
                ..
            } => {
                let min = self.eval(min)?;
                let extent = self.eval(extent)?;
                let saved = self.scalars.get(var).copied();
                for i in min..min + extent {
                    self.scalars.insert(var.clone(), i);
                    self.exec(body, observer)?;
                }
                match saved {
                    Some(v) => self.scalars.insert(var.clone(), v),
                    None => self.scalars.remove(var),
                };
                Ok(())
            }
            Stmt::Write {
                array,
                indices,
                value,
            } => {
                let idx: Vec<i64> = indices
                    .iter()
                    .map(|i| self.eval(i))
                    .collect::<Result<_, _>>()?;
                let v = self.eval(value)?;
                let func = self.func.clone();
                let store = self.arrays.get_mut(array).ok_or_else(|| {
                    Diagnostic::error(
                        Loc::func(func),
                        format!("write to unknown array {}", array),
                    )
                })?;
                store.insert(idx.clone(), v);
                observer(array, &idx, v);
                Ok(())
            }
            Stmt::If { cond, then_, else_ } => {
                if self.eval(cond)? != 0 {
                    self.exec(then_, observer)
                } else if let Some(e) = else_ {
                    self.exec(e, observer)
                } else {
                    Ok(())
                }
            }
            Stmt::Seq(stmts) => {
                for s in stmts {
                    self.exec(s, observer)?;
                }
                Ok(())
            }
            Stmt::Let { name, value, body } => {
                let v = self.eval(value)?;
                let saved = self.scalars.get(name).copied();
                self.scalars.insert(name.clone(), v);
                self.exec(body, observer)?;
                match saved {
                    Some(old) => self.scalars.insert(name.clone(), old),
                    None => self.scalars.remove(name),
                };
                Ok(())
            }
            Stmt::Alloc { name, body, .. } => {
                self.arrays.insert(name.clone(), ArrayStore::new());
                self.exec(body, observer)
            }
        }
    }

    fn eval(&self, e: &Expr) -> Result<i64, Diagnostic> {
        Ok(match e {
            Expr::IntConst(v) => *v,
            Expr::BoolConst(b) => *b as i64,
            Expr::Var(name) => *self
                .scalars
                .get(name)
                .ok_or_else(|| self.err(format!("unbound variable {}", name)))?,
            Expr::Read { array, indices } => {
                let idx: Vec<i64> = indices
                    .iter()
                    .map(|i| self.eval(i))
                    .collect::<Result<_, _>>()?;
                let store = self
                    .arrays
                    .get(array)
                    .ok_or_else(|| self.err(format!("read of unknown array {}", array)))?;
                store.get(&idx).copied().unwrap_or(0)
            }
            Expr::Add(a, b) => self.eval(a)? + self.eval(b)?,
            Expr::Sub(a, b) => self.eval(a)? - self.eval(b)?,
            Expr::Mul(a, b) => self.eval(a)? * self.eval(b)?,
            Expr::Div(a, b) => {
                let d = self.eval(b)?;
                if d == 0 {
                    return Err(self.err("division by zero".to_string()));
                }
                self.eval(a)?.div_euclid(d)
            }
            Expr::Mod(a, b) => {
                let d = self.eval(b)?;
                if d == 0 {
                    return Err(self.err("modulo by zero".to_string()));
                }
                self.eval(a)?.rem_euclid(d)
            }
            Expr::Min(a, b) => self.eval(a)?.min(self.eval(b)?),
            Expr::Max(a, b) => self.eval(a)?.max(self.eval(b)?),
            Expr::Eq(a, b) => (self.eval(a)? == self.eval(b)?) as i64,
            Expr::Ne(a, b) => (self.eval(a)? != self.eval(b)?) as i64,
            Expr::Lt(a, b) => (self.eval(a)? < self.eval(b)?) as i64,
            Expr::Le(a, b) => (self.eval(a)? <= self.eval(b)?) as i64,
            Expr::Gt(a, b) => (self.eval(a)? > self.eval(b)?) as i64,
            Expr::Ge(a, b) => (self.eval(a)? >= self.eval(b)?) as i64,
            Expr::And(a, b) => (self.eval(a)? != 0 && self.eval(b)? != 0) as i64,
            Expr::Or(a, b) => (self.eval(a)? != 0 || self.eval(b)? != 0) as i64,
            Expr::Not(a) => (self.eval(a)? == 0) as i64,
            Expr::Select { cond, then_, else_ } => {
                if self.eval(cond)? != 0 {
                    self.eval(then_)?
                } else {
                    self.eval(else_)?
                }
            }
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::LoopKind;

    fn accumulating_nest() -> Nest {
        // C[i, j] = C[i - 1, j] + A[i, j] over [0, 3) x [0, 2).
        Nest {
            name: "C".into(),
            body: Stmt::loop_(
                "i",
                Expr::int(0),
                Expr::int(3),
                LoopKind::Serial,
                Stmt::loop_(
                    "j",
                    Expr::int(0),
                    Expr::int(2),
                    LoopKind::Unrolled,
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

    #[test]
    fn recurrence_accumulates_over_time() {
        let mut interp = Interp::new();
        for i in 0..3 {
            for j in 0..2 {
                interp.set("A", vec![i, j], 10 * i + j);
            }
        }
        interp.run_nest(&accumulating_nest()).unwrap();
        // Column sums: (0 + 10 + 20, 1 + 11 + 21).
        assert_eq!(interp.get("C", &[2, 0]), Some(30));
        assert_eq!(interp.get("C", &[2, 1]), Some(33));
    }

    #[test]
    fn alloc_reads_zero_before_first_write() {
        let nest = Nest {
            name: "out".into(),
            body: Stmt::alloc(
                "r",
                vec![crate::ir::Dim::new(Expr::int(0), Expr::int(1))],
                Stmt::write(
                    "out",
                    vec![Expr::int(0)],
                    Expr::read("r", vec![Expr::int(0)]) + Expr::int(7),
                ),
            ),
        };
        let mut interp = Interp::new();
        interp.run_nest(&nest).unwrap();
        assert_eq!(interp.get("out", &[0]), Some(7));
    }

    #[test]
    fn observer_sees_writes_in_order() {
        let mut interp = Interp::new();
        interp.declare("A");
        let mut order = Vec::new();
        interp
            .run_nest_observed(&accumulating_nest(), &mut |array, idx, _| {
                if array == "C" {
                    order.push(idx.to_vec());
                }
            })
            .unwrap();
        assert_eq!(order.len(), 6);
        assert_eq!(order[0], vec![0, 0]);
        assert_eq!(order[5], vec![2, 1]);
    }

    #[test]
    fn unbound_variable_is_reported() {
        let nest = Nest {
            name: "out".into(),
            body: Stmt::write("out", vec![Expr::int(0)], Expr::var("ghost")),
        };
        let err = Interp::new().run_nest(&nest).unwrap_err();
        assert!(err.message.contains("ghost"), "{}", err);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let nest = Nest {
            name: "out".into(),
            body: Stmt::write(
                "out",
                vec![Expr::int(0)],
                Expr::int(1).div(Expr::int(0)),
            ),
        };
        let err = Interp::new().run_nest(&nest).unwrap_err();
        assert!(err.message.contains("division"), "{}", err);
    }
}
