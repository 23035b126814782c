// ir.rs — Statement-level IR for recurrence loop nests
//
// A loop nest is a tree of `Stmt` nodes over `expr::Expr` scalars. The same
// tree type is used before and after every transform pass; passes differ
// only in which node shapes they introduce (e.g. `Alloc` for registers and
// buffers appears only in synthesized output).
//
// Invariant: loop and let variable names are unique within one nest. The
// builder enforces this; passes rely on it when substituting.
//
// Preconditions: none (types and pure functions).
// Postconditions: none.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::expr::{self, Expr};

// ── Loop kind ────────────────────────────────────────────────────────────

/// Whether a loop describes sequential clocks or spatially replicated
/// hardware. Unrolled loops become arrays of processing elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Serial,
    Unrolled,
}

// ── Statements ───────────────────────────────────────────────────────────

/// One dimension of an allocation: half-open range `[min, min + extent)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dim {
    pub min: Expr,
    pub extent: Expr,
}

impl Dim {
    pub fn new(min: Expr, extent: Expr) -> Self {
        Self { min, extent }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Loop {
        var: String,
        min: Expr,
        extent: Expr,
        kind: LoopKind,
        body: Box<Stmt>,
    },
    Write {
        array: String,
        indices: Vec<Expr>,
        value: Expr,
    },
    If {
        cond: Expr,
        then_: Box<Stmt>,
        else_: Option<Box<Stmt>>,
    },
    Seq(Vec<Stmt>),
    Let {
        name: String,
        value: Expr,
        body: Box<Stmt>,
    },
    /// Declares storage named `name` over `dims`, live for `body`.
    Alloc {
        name: String,
        dims: Vec<Dim>,
        body: Box<Stmt>,
    },
}

impl Stmt {
    pub fn loop_(var: impl Into<String>, min: Expr, extent: Expr, kind: LoopKind, body: Stmt) -> Stmt {
        Stmt::Loop {
            var: var.into(),
            min,
            extent,
            kind,
            body: Box::new(body),
        }
    }

    pub fn write(array: impl Into<String>, indices: Vec<Expr>, value: Expr) -> Stmt {
        Stmt::Write {
            array: array.into(),
            indices,
            value,
        }
    }

    pub fn if_(cond: Expr, then_: Stmt) -> Stmt {
        Stmt::If {
            cond,
            then_: Box::new(then_),
            else_: None,
        }
    }

    pub fn if_else(cond: Expr, then_: Stmt, else_: Stmt) -> Stmt {
        Stmt::If {
            cond,
            then_: Box::new(then_),
            else_: Some(Box::new(else_)),
        }
    }

    pub fn let_(name: impl Into<String>, value: Expr, body: Stmt) -> Stmt {
        Stmt::Let {
            name: name.into(),
            value,
            body: Box::new(body),
        }
    }

    pub fn alloc(name: impl Into<String>, dims: Vec<Dim>, body: Stmt) -> Stmt {
        Stmt::Alloc {
            name: name.into(),
            dims,
            body: Box::new(body),
        }
    }

    /// Wrap `body` in a stack of `Let`s, innermost binding last in `binds`.
    pub fn lets(binds: Vec<(String, Expr)>, body: Stmt) -> Stmt {
        binds
            .into_iter()
            .rev()
            .fold(body, |acc, (name, value)| Stmt::let_(name, value, acc))
    }

    /// Flatten trivial sequences away.
    pub fn seq(stmts: Vec<Stmt>) -> Stmt {
        let mut flat = Vec::new();
        for s in stmts {
            match s {
                Stmt::Seq(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap()
        } else {
            Stmt::Seq(flat)
        }
    }
}

// ── Loop metadata ────────────────────────────────────────────────────────

/// Metadata for one loop on the path from the nest root to a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopInfo {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
    pub kind: LoopKind,
}

/// Collect the loops of a nest outermost-first, following the unique loop
/// spine (recurrence nests have exactly one loop at each level).
pub fn loop_spine(stmt: &Stmt) -> Vec<LoopInfo> {
    let mut out = Vec::new();
    let mut cur = stmt;
    loop {
        match cur {
            Stmt::Loop {
                var,
                min,
                extent,
                kind,
                body,
            } => {
                out.push(LoopInfo {
                    var: var.clone(),
                    min: min.clone(),
                    extent: extent.clone(),
                    kind: *kind,
                });
                cur = body;
            }
            Stmt::Let { body, .. } | Stmt::Alloc { body, .. } => cur = body,
            _ => return out,
        }
    }
}

/// The statement below the loop spine (the nest's compute body).
pub fn spine_body(stmt: &Stmt) -> &Stmt {
    let mut cur = stmt;
    loop {
        match cur {
            Stmt::Loop { body, .. } | Stmt::Let { body, .. } | Stmt::Alloc { body, .. } => {
                cur = body
            }
            _ => return cur,
        }
    }
}

// ── Traversal ────────────────────────────────────────────────────────────

/// Rewrite every expression position in the statement tree.
pub fn map_exprs(stmt: &Stmt, f: &mut impl FnMut(&Expr) -> Expr) -> Stmt {
    map_exprs_dyn(stmt, f)
}

fn map_exprs_dyn(stmt: &Stmt, f: &mut dyn FnMut(&Expr) -> Expr) -> Stmt {
    match stmt {
        Stmt::Loop {
            var,
            min,
            extent,
            kind,
            body,
        } => Stmt::Loop {
            var: var.clone(),
            min: f(min),
            extent: f(extent),
            kind: *kind,
            body: Box::new(map_exprs_dyn(body, f)),
        },
        Stmt::Write {
            array,
            indices,
            value,
        } => Stmt::Write {
            array: array.clone(),
            indices: indices.iter().map(|i| f(i)).collect(),
            value: f(value),
        },
        Stmt::If { cond, then_, else_ } => Stmt::If {
            cond: f(cond),
            then_: Box::new(map_exprs_dyn(then_, f)),
            else_: else_.as_ref().map(|e| Box::new(map_exprs_dyn(e, f))),
        },
        Stmt::Seq(stmts) => Stmt::Seq(stmts.iter().map(|s| map_exprs_dyn(s, f)).collect()),
        Stmt::Let { name, value, body } => Stmt::Let {
            name: name.clone(),
            value: f(value),
            body: Box::new(map_exprs_dyn(body, f)),
        },
        Stmt::Alloc { name, dims, body } => Stmt::Alloc {
            name: name.clone(),
            dims: dims
                .iter()
                .map(|d| Dim::new(f(&d.min), f(&d.extent)))
                .collect(),
            body: Box::new(map_exprs_dyn(body, f)),
        },
    }
}

/// Visit every expression position in the statement tree.
pub fn visit_exprs(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    visit_exprs_dyn(stmt, f)
}

fn visit_exprs_dyn(stmt: &Stmt, f: &mut dyn FnMut(&Expr)) {
    match stmt {
        Stmt::Loop {
            min, extent, body, ..
        } => {
            f(min);
            f(extent);
            visit_exprs_dyn(body, f);
        }
        Stmt::Write { indices, value, .. } => {
            for i in indices {
                f(i);
            }
            f(value);
        }
        Stmt::If { cond, then_, else_ } => {
            f(cond);
            visit_exprs_dyn(then_, f);
            if let Some(e) = else_ {
                visit_exprs_dyn(e, f);
            }
        }
        Stmt::Seq(stmts) => {
            for s in stmts {
                visit_exprs_dyn(s, f);
            }
        }
        Stmt::Let { value, body, .. } => {
            f(value);
            visit_exprs_dyn(body, f);
        }
        Stmt::Alloc { dims, body, .. } => {
            for d in dims {
                f(&d.min);
                f(&d.extent);
            }
            visit_exprs_dyn(body, f);
        }
    }
}

/// Substitute a variable throughout the statement tree.
pub fn substitute(name: &str, value: &Expr, stmt: &Stmt) -> Stmt {
    map_exprs(stmt, &mut |e| expr::substitute(name, value, e))
}

/// Replace every expression subtree equal to `target` with `replacement`,
/// in every expression position of the statement tree.
pub fn replace_expr(target: &Expr, replacement: &Expr, stmt: &Stmt) -> Stmt {
    map_exprs(stmt, &mut |e| expr::replace(target, replacement, e))
}

/// Simplify every expression position.
pub fn simplify(stmt: &Stmt) -> Stmt {
    map_exprs(stmt, &mut |e| expr::simplify(e))
}

// ── Program container ────────────────────────────────────────────────────

/// One recurrence function: a named loop nest whose writes target the
/// array of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nest {
    pub name: String,
    pub body: Stmt,
}

/// A set of recurrence functions fed to the pipeline together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub nests: Vec<Nest>,
}

impl Program {
    pub fn nest(&self, name: &str) -> Option<&Nest> {
        self.nests.iter().find(|n| n.name == name)
    }

    pub fn nest_mut(&mut self, name: &str) -> Option<&mut Nest> {
        self.nests.iter_mut().find(|n| n.name == name)
    }
}

// ── Display ──────────────────────────────────────────────────────────────

impl Stmt {
    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Stmt::Loop {
                var,
                min,
                extent,
                kind,
                body,
            } => {
                let kw = match kind {
                    LoopKind::Serial => "for",
                    LoopKind::Unrolled => "unrolled",
                };
                writeln!(f, "{}{} {} in [{}, {}+{}):", pad, kw, var, min, min, extent)?;
                body.fmt_indent(f, depth + 1)
            }
            Stmt::Write {
                array,
                indices,
                value,
            } => {
                write!(f, "{}{}[", pad, array)?;
                for (i, idx) in indices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", idx)?;
                }
                writeln!(f, "] = {}", value)
            }
            Stmt::If { cond, then_, else_ } => {
                writeln!(f, "{}if {}:", pad, cond)?;
                then_.fmt_indent(f, depth + 1)?;
                if let Some(e) = else_ {
                    writeln!(f, "{}else:", pad)?;
                    e.fmt_indent(f, depth + 1)?;
                }
                Ok(())
            }
            Stmt::Seq(stmts) => {
                for s in stmts {
                    s.fmt_indent(f, depth)?;
                }
                Ok(())
            }
            Stmt::Let { name, value, body } => {
                writeln!(f, "{}let {} = {}:", pad, name, value)?;
                body.fmt_indent(f, depth + 1)
            }
            Stmt::Alloc { name, dims, body } => {
                write!(f, "{}alloc {}[", pad, name)?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", d.min, d.extent)?;
                }
                writeln!(f, "]:")?;
                body.fmt_indent(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

impl fmt::Display for Nest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {}:", self.name)?;
        self.body.fmt_indent(f, 1)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, nest) in self.nests.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", nest)?;
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
