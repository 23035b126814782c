// shift_reg.rs — Shift-register sizing for space-time transformed nests
//
// Every reference to a recurrence array carries a time distance under the
// schedule; the register for that array must span the union of all
// distances seen. Bounds only ever widen: recording a distance never
// shrinks a previously recorded range.
//
// Preconditions: distances are non-negative (causality is checked by the
//   transform pass before recording).
// Postconditions: `depth()` of every finalized register covers every
//   recorded distance; degenerate registers (only distance 0) are flagged
//   so no storage is declared for them.
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;

use crate::ir::Dim;

// ── Per-array bound ──────────────────────────────────────────────────────

/// Maximum dependence distance for one recurrence array. The defining
/// write anchors distance zero (it lands in the temp), so only the upper
/// end of the range needs tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegBound {
    pub space_dims: Vec<Dim>,
    pub max_distance: i64,
}

impl RegBound {
    pub fn new(space_dims: Vec<Dim>) -> Self {
        Self {
            space_dims,
            max_distance: 0,
        }
    }

    /// Widen-only update.
    pub fn widen(&mut self, distance: i64) {
        self.max_distance = self.max_distance.max(distance);
    }
}

// ── Plan ─────────────────────────────────────────────────────────────────

/// Accumulates bounds per array while the transform pass walks references.
/// Keyed by array name in a `BTreeMap` so finalization order is stable.
#[derive(Debug, Default)]
pub struct ShiftRegPlan {
    bounds: BTreeMap<String, RegBound>,
}

impl ShiftRegPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, array: &str, space_dims: Vec<Dim>) {
        self.bounds
            .entry(array.to_string())
            .or_insert_with(|| RegBound::new(space_dims));
    }

    pub fn record(&mut self, array: &str, distance: i64) {
        if let Some(b) = self.bounds.get_mut(array) {
            b.widen(distance);
        }
    }

    pub fn bound(&self, array: &str) -> Option<&RegBound> {
        self.bounds.get(array)
    }

    /// Produce the final register set, array-name order.
    pub fn finalize(self) -> Vec<ShiftRegister> {
        self.bounds
            .into_iter()
            .map(|(array, b)| ShiftRegister {
                reg_name: format!("{}_shreg", array),
                temp_name: format!("{}_temp", array),
                array,
                space_dims: b.space_dims,
                max_distance: b.max_distance,
            })
            .collect()
    }
}

// ── Finalized register ───────────────────────────────────────────────────

/// A sized register for one recurrence array. `temp_name` holds the value
/// produced this clock; `reg_name` (absent when degenerate) holds the
/// previous `max_distance` clocks, slot `d - 1` being the value from `d`
/// clocks ago.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftRegister {
    pub array: String,
    pub reg_name: String,
    pub temp_name: String,
    pub space_dims: Vec<Dim>,
    pub max_distance: i64,
}

impl ShiftRegister {
    /// Number of delay slots. Zero means only the current-clock temp is
    /// needed and no shift register is declared.
    pub fn depth(&self) -> i64 {
        self.max_distance
    }

    pub fn is_degenerate(&self) -> bool {
        self.max_distance == 0
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
