// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all transform passes.
// Locations are symbolic (function and loop names) rather than byte spans:
// the input is builder-constructed IR, so there is no source text to point at.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0102`, `W0301`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable codes for every diagnostic the transform passes emit.
pub mod codes {
    use super::DiagCode;

    /// Transform descriptor is malformed (wrong matrix shape, space vars not
    /// an innermost contiguous prefix, unknown loop name, non-unrolled
    /// scatter/gather loop).
    pub const SCHEMA_ERROR: DiagCode = DiagCode("E0101");
    /// Projection + schedule matrix has no integer inverse and no reverse
    /// map was supplied.
    pub const NON_INVERTIBLE_TRANSFORM: DiagCode = DiagCode("E0102");
    /// A scatter/buffer/gather directive's source array is referenced from
    /// more than one site in the consumer.
    pub const AMBIGUOUS_REFERENCE: DiagCode = DiagCode("E0201");
    /// A loop bound that buffer synthesis must enumerate is not a compile
    /// time constant.
    pub const NON_CONSTANT_BOUND: DiagCode = DiagCode("E0202");
    /// The path condition guarding the rewritten reference is not a
    /// conjunction of comparisons over loop variables.
    pub const UNSUPPORTED_CONDITION: DiagCode = DiagCode("E0203");
    /// Buffer reads fewer values per period than it writes, so the buffer
    /// cannot hide producer latency.
    pub const LATENCY_HIDING_VIOLATION: DiagCode = DiagCode("W0301");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Location ─────────────────────────────────────────────────────────────

/// A symbolic location inside the input program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loc {
    /// Name of the recurrence function (loop nest) the diagnostic refers to.
    pub func: String,
    /// Loop variable the diagnostic refers to, when one applies.
    pub loop_var: Option<String>,
}

impl Loc {
    pub fn func(name: impl Into<String>) -> Self {
        Self {
            func: name.into(),
            loop_var: None,
        }
    }

    pub fn in_loop(name: impl Into<String>, loop_var: impl Into<String>) -> Self {
        Self {
            func: name.into(),
            loop_var: Some(loop_var.into()),
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.loop_var {
            Some(v) => write!(f, "{}.{}", self.func, v),
            None => write!(f, "{}", self.func),
        }
    }
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain explaining a propagated constraint failure.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub loc: Option<Loc>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any transform pass.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub loc: Loc,
    pub message: String,
    pub hint: Option<String>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or causes.
    pub fn new(level: DiagLevel, loc: Loc, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            loc,
            message: message.into(),
            hint: None,
            cause_chain: Vec::new(),
        }
    }

    /// Shorthand for a fatal error at `loc`.
    pub fn error(loc: Loc, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, loc, message)
    }

    /// Shorthand for a warning at `loc`.
    pub fn warning(loc: Loc, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, loc, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, loc: Option<Loc>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            loc,
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}: {}", level, code, self.loc, self.message)?;
        } else {
            write!(f, "{}: {}: {}", level, self.loc, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
