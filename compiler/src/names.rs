// names.rs — Deterministic unique-name allocation
//
// Synthesized storage and loop variables (shift registers, double buffers,
// scatter/gather loops) need names that cannot collide with user loop
// variables or with each other. Names are allocated in request order from
// per-prefix counters, so identical inputs always produce identical names.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct NameGen {
    counters: BTreeMap<String, u32>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// First request for a prefix returns the prefix itself; later requests
    /// append `_1`, `_2`, ... in order.
    pub fn fresh(&mut self, prefix: &str) -> String {
        let n = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = if *n == 0 {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, n)
        };
        *n += 1;
        name
    }
}
