// expr.rs — Scalar expression union for the transform IR
//
// A small closed expression language: integer and boolean constants, loop
// variables, array reads, arithmetic, comparisons, boolean connectives, and
// select. Every pass manipulates these trees through `simplify`,
// `substitute`, and `replace`; no pass pattern-matches on unsimplified
// shapes it did not build itself.
//
// Preconditions: none (types and pure functions).
// Postconditions: `simplify` is idempotent on its own output.
// Failure modes: none (division by a zero constant is left unfolded).
// Side effects: none.

use std::fmt;
use std::ops;

// ── Expression tree ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    IntConst(i64),
    BoolConst(bool),
    Var(String),
    /// A read of one element of a named array (or a call to another
    /// recurrence function, which is the same thing at this level).
    Read {
        array: String,
        indices: Vec<Expr>,
    },
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Select {
        cond: Box<Expr>,
        then_: Box<Expr>,
        else_: Box<Expr>,
    },
}

impl Expr {
    pub fn int(v: i64) -> Expr {
        Expr::IntConst(v)
    }

    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn read(array: impl Into<String>, indices: Vec<Expr>) -> Expr {
        Expr::Read {
            array: array.into(),
            indices,
        }
    }

    pub fn min(a: Expr, b: Expr) -> Expr {
        Expr::Min(Box::new(a), Box::new(b))
    }

    pub fn max(a: Expr, b: Expr) -> Expr {
        Expr::Max(Box::new(a), Box::new(b))
    }

    pub fn select(cond: Expr, then_: Expr, else_: Expr) -> Expr {
        Expr::Select {
            cond: Box::new(cond),
            then_: Box::new(then_),
            else_: Box::new(else_),
        }
    }

    pub fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    pub fn rem(self, rhs: Expr) -> Expr {
        Expr::Mod(Box::new(self), Box::new(rhs))
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        Expr::Eq(Box::new(self), Box::new(rhs))
    }

    pub fn ne(self, rhs: Expr) -> Expr {
        Expr::Ne(Box::new(self), Box::new(rhs))
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::Lt(Box::new(self), Box::new(rhs))
    }

    pub fn le(self, rhs: Expr) -> Expr {
        Expr::Le(Box::new(self), Box::new(rhs))
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::Gt(Box::new(self), Box::new(rhs))
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::Ge(Box::new(self), Box::new(rhs))
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// The constant value, if this node is an integer constant.
    pub fn as_const(&self) -> Option<i64> {
        match self {
            Expr::IntConst(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::IntConst(0))
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

// ── Generic traversal ────────────────────────────────────────────────────

/// Pre-order rewrite. `f` is offered each node outermost-first; returning
/// `Some(e)` replaces the node (children are not visited), `None` recurses.
pub fn transform(expr: &Expr, f: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
    transform_dyn(expr, f)
}

fn transform_dyn(expr: &Expr, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Expr {
    if let Some(replacement) = f(expr) {
        return replacement;
    }
    fn t(e: &Expr, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Box<Expr> {
        Box::new(transform_dyn(e, f))
    }
    match expr {
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_) => expr.clone(),
        Expr::Read { array, indices } => Expr::Read {
            array: array.clone(),
            indices: indices.iter().map(|i| transform_dyn(i, f)).collect(),
        },
        Expr::Add(a, b) => Expr::Add(t(a, f), t(b, f)),
        Expr::Sub(a, b) => Expr::Sub(t(a, f), t(b, f)),
        Expr::Mul(a, b) => Expr::Mul(t(a, f), t(b, f)),
        Expr::Div(a, b) => Expr::Div(t(a, f), t(b, f)),
        Expr::Mod(a, b) => Expr::Mod(t(a, f), t(b, f)),
        Expr::Min(a, b) => Expr::Min(t(a, f), t(b, f)),
        Expr::Max(a, b) => Expr::Max(t(a, f), t(b, f)),
        Expr::Eq(a, b) => Expr::Eq(t(a, f), t(b, f)),
        Expr::Ne(a, b) => Expr::Ne(t(a, f), t(b, f)),
        Expr::Lt(a, b) => Expr::Lt(t(a, f), t(b, f)),
        Expr::Le(a, b) => Expr::Le(t(a, f), t(b, f)),
        Expr::Gt(a, b) => Expr::Gt(t(a, f), t(b, f)),
        Expr::Ge(a, b) => Expr::Ge(t(a, f), t(b, f)),
        Expr::And(a, b) => Expr::And(t(a, f), t(b, f)),
        Expr::Or(a, b) => Expr::Or(t(a, f), t(b, f)),
        Expr::Not(a) => Expr::Not(t(a, f)),
        Expr::Select { cond, then_, else_ } => Expr::Select {
            cond: t(cond, f),
            then_: t(then_, f),
            else_: t(else_, f),
        },
    }
}

/// Pre-order visit of every node.
pub fn visit(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    visit_dyn(expr, f)
}

fn visit_dyn(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_) => {}
        Expr::Read { indices, .. } => {
            for i in indices {
                visit_dyn(i, f);
            }
        }
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
            visit_dyn(a, f);
            visit_dyn(b, f);
        }
        Expr::Not(a) => visit_dyn(a, f),
        Expr::Select { cond, then_, else_ } => {
            visit_dyn(cond, f);
            visit_dyn(then_, f);
            visit_dyn(else_, f);
        }
    }
}

// ── Substitution and replacement ─────────────────────────────────────────

/// Replace every occurrence of the variable `name` with `value`.
pub fn substitute(name: &str, value: &Expr, expr: &Expr) -> Expr {
    transform(expr, &mut |e| match e {
        Expr::Var(v) if v == name => Some(value.clone()),
        _ => None,
    })
}

/// Replace every subtree structurally equal to `target` with `replacement`.
pub fn replace(target: &Expr, replacement: &Expr, expr: &Expr) -> Expr {
    transform(expr, &mut |e| {
        if e == target {
            Some(replacement.clone())
        } else {
            None
        }
    })
}

/// Structural equality modulo simplification.
pub fn equal(a: &Expr, b: &Expr) -> bool {
    simplify(a) == simplify(b)
}

// ── Simplification ───────────────────────────────────────────────────────

/// Bottom-up algebraic simplifier: constant folding, identity elimination,
/// and re-association of constant addends. Division and modulo by a zero
/// constant are left as-is rather than folded.
pub fn simplify(expr: &Expr) -> Expr {
    match expr {
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_) => expr.clone(),
        Expr::Read { array, indices } => Expr::Read {
            array: array.clone(),
            indices: indices.iter().map(simplify).collect(),
        },
        Expr::Add(a, b) => simplify_add(simplify(a), simplify(b)),
        Expr::Sub(a, b) => simplify_sub(simplify(a), simplify(b)),
        Expr::Mul(a, b) => simplify_mul(simplify(a), simplify(b)),
        Expr::Div(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (a.as_const(), b.as_const()) {
                (Some(x), Some(y)) if y != 0 => Expr::IntConst(x / y),
                (_, Some(1)) => a,
                _ => Expr::Div(Box::new(a), Box::new(b)),
            }
        }
        Expr::Mod(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (a.as_const(), b.as_const()) {
                (Some(x), Some(y)) if y != 0 => Expr::IntConst(x % y),
                (_, Some(1)) => Expr::IntConst(0),
                _ => Expr::Mod(Box::new(a), Box::new(b)),
            }
        }
        Expr::Min(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (a.as_const(), b.as_const()) {
                (Some(x), Some(y)) => Expr::IntConst(x.min(y)),
                _ if a == b => a,
                _ => Expr::Min(Box::new(a), Box::new(b)),
            }
        }
        Expr::Max(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (a.as_const(), b.as_const()) {
                (Some(x), Some(y)) => Expr::IntConst(x.max(y)),
                _ if a == b => a,
                _ => Expr::Max(Box::new(a), Box::new(b)),
            }
        }
        Expr::Eq(a, b) => simplify_cmp(simplify(a), simplify(b), |x, y| x == y, true, Expr::Eq),
        Expr::Ne(a, b) => simplify_cmp(simplify(a), simplify(b), |x, y| x != y, false, Expr::Ne),
        Expr::Lt(a, b) => simplify_cmp(simplify(a), simplify(b), |x, y| x < y, false, Expr::Lt),
        Expr::Le(a, b) => simplify_cmp(simplify(a), simplify(b), |x, y| x <= y, true, Expr::Le),
        Expr::Gt(a, b) => simplify_cmp(simplify(a), simplify(b), |x, y| x > y, false, Expr::Gt),
        Expr::Ge(a, b) => simplify_cmp(simplify(a), simplify(b), |x, y| x >= y, true, Expr::Ge),
        Expr::And(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (&a, &b) {
                (Expr::BoolConst(false), _) | (_, Expr::BoolConst(false)) => {
                    Expr::BoolConst(false)
                }
                (Expr::BoolConst(true), _) => b.clone(),
                (_, Expr::BoolConst(true)) => a.clone(),
                _ => Expr::And(Box::new(a), Box::new(b)),
            }
        }
        Expr::Or(a, b) => {
            let (a, b) = (simplify(a), simplify(b));
            match (&a, &b) {
                (Expr::BoolConst(true), _) | (_, Expr::BoolConst(true)) => Expr::BoolConst(true),
                (Expr::BoolConst(false), _) => b.clone(),
                (_, Expr::BoolConst(false)) => a.clone(),
                _ => Expr::Or(Box::new(a), Box::new(b)),
            }
        }
        Expr::Not(a) => match simplify(a) {
            Expr::BoolConst(v) => Expr::BoolConst(!v),
            Expr::Not(inner) => *inner,
            other => Expr::Not(Box::new(other)),
        },
        Expr::Select { cond, then_, else_ } => {
            let (cond, then_, else_) = (simplify(cond), simplify(then_), simplify(else_));
            match &cond {
                Expr::BoolConst(true) => then_,
                Expr::BoolConst(false) => else_,
                _ if then_ == else_ => then_,
                _ => Expr::Select {
                    cond: Box::new(cond),
                    then_: Box::new(then_),
                    else_: Box::new(else_),
                },
            }
        }
    }
}

fn simplify_add(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (Some(x), Some(y)) => return Expr::IntConst(x + y),
        (Some(0), _) => return b,
        (_, Some(0)) => return a,
        _ => {}
    }
    // Constant addends migrate rightward so nested sums fold.
    if let Some(c1) = a.as_const() {
        return simplify_add(b, Expr::IntConst(c1));
    }
    if let (Expr::Add(x, c1), Some(c2)) = (&a, b.as_const()) {
        if let Some(c1) = c1.as_const() {
            return simplify_add((**x).clone(), Expr::IntConst(c1 + c2));
        }
    }
    Expr::Add(Box::new(a), Box::new(b))
}

fn simplify_sub(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (Some(x), Some(y)) => return Expr::IntConst(x - y),
        (_, Some(0)) => return a,
        _ => {}
    }
    if a == b {
        return Expr::IntConst(0);
    }
    if let Some(c) = b.as_const() {
        return simplify_add(a, Expr::IntConst(-c));
    }
    Expr::Sub(Box::new(a), Box::new(b))
}

fn simplify_mul(a: Expr, b: Expr) -> Expr {
    match (a.as_const(), b.as_const()) {
        (Some(x), Some(y)) => return Expr::IntConst(x * y),
        (Some(0), _) | (_, Some(0)) => return Expr::IntConst(0),
        (Some(1), _) => return b,
        (_, Some(1)) => return a,
        _ => {}
    }
    if a.as_const().is_some() {
        return Expr::Mul(Box::new(b), Box::new(a));
    }
    Expr::Mul(Box::new(a), Box::new(b))
}

fn simplify_cmp(
    a: Expr,
    b: Expr,
    fold: impl Fn(i64, i64) -> bool,
    reflexive: bool,
    rebuild: impl Fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Expr {
    if let (Some(x), Some(y)) = (a.as_const(), b.as_const()) {
        return Expr::BoolConst(fold(x, y));
    }
    if a == b {
        return Expr::BoolConst(reflexive);
    }
    rebuild(Box::new(a), Box::new(b))
}

// ── Display ──────────────────────────────────────────────────────────────

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bin(
            f: &mut fmt::Formatter<'_>,
            op: &str,
            a: &Expr,
            b: &Expr,
        ) -> fmt::Result {
            write!(f, "({} {} {})", a, op, b)
        }
        match self {
            Expr::IntConst(v) => write!(f, "{}", v),
            Expr::BoolConst(v) => write!(f, "{}", v),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Read { array, indices } => {
                write!(f, "{}[", array)?;
                for (i, idx) in indices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", idx)?;
                }
                write!(f, "]")
            }
            Expr::Add(a, b) => bin(f, "+", a, b),
            Expr::Sub(a, b) => bin(f, "-", a, b),
            Expr::Mul(a, b) => bin(f, "*", a, b),
            Expr::Div(a, b) => bin(f, "/", a, b),
            Expr::Mod(a, b) => bin(f, "%", a, b),
            Expr::Min(a, b) => write!(f, "min({}, {})", a, b),
            Expr::Max(a, b) => write!(f, "max({}, {})", a, b),
            Expr::Eq(a, b) => bin(f, "==", a, b),
            Expr::Ne(a, b) => bin(f, "!=", a, b),
            Expr::Lt(a, b) => bin(f, "<", a, b),
            Expr::Le(a, b) => bin(f, "<=", a, b),
            Expr::Gt(a, b) => bin(f, ">", a, b),
            Expr::Ge(a, b) => bin(f, ">=", a, b),
            Expr::And(a, b) => bin(f, "&&", a, b),
            Expr::Or(a, b) => bin(f, "||", a, b),
            Expr::Not(a) => write!(f, "!{}", a),
            Expr::Select { cond, then_, else_ } => {
                write!(f, "select({}, {}, {})", cond, then_, else_)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
