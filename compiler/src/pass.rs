// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the transformer's 6 passes, their dependency edges, and the
// artifacts they produce. Used by the pipeline runner to compute minimal
// pass subsets when a caller only needs part of the lowering.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each transform pass (nest construction is outside the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Validate,
    SpaceTime,
    Scatter,
    Buffer,
    Gather,
    Report,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Validated, // Schedule (shape-checked)
    Systolic,  // transformed nests + ShiftRegister set
    Chains,    // ChainDecl set
    Buffers,   // BufferDecl + CycleDecl sets
    Streams,   // gather ChainDecl set
    Report,    // SynthesisReport
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a transform pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Describes what invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[],
            outputs: &[ArtifactId::Validated],
            invalidation_key: "schedule descriptors",
            invariants: "matrix shapes consistent, every directive names a loop",
        },
        PassId::SpaceTime => PassDescriptor {
            name: "space_time",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Systolic],
            invalidation_key: "program + transforms",
            invariants: "one serial time loop per transformed nest, distances non-negative",
        },
        PassId::Scatter => PassDescriptor {
            name: "scatter",
            inputs: &[PassId::SpaceTime],
            outputs: &[ArtifactId::Chains],
            invalidation_key: "program + scatter directives",
            invariants: "producer read only at the chain boundary",
        },
        PassId::Buffer => PassDescriptor {
            name: "buffer",
            inputs: &[PassId::SpaceTime],
            outputs: &[ArtifactId::Buffers],
            invalidation_key: "program + buffer directives",
            invariants: "one clocked controller per buffered consumer",
        },
        PassId::Gather => PassDescriptor {
            name: "gather",
            inputs: &[PassId::SpaceTime],
            outputs: &[ArtifactId::Streams],
            invalidation_key: "program + gather directives",
            invariants: "collector drains one element per clock",
        },
        PassId::Report => PassDescriptor {
            name: "report",
            inputs: &[PassId::Scatter, PassId::Buffer, PassId::Gather],
            outputs: &[ArtifactId::Report],
            invalidation_key: "all synthesized declarations",
            invariants: "report lists every register, chain, and buffer",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All 6 pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 6] = [
    PassId::Validate,
    PassId::SpaceTime,
    PassId::Scatter,
    PassId::Buffer,
    PassId::Gather,
    PassId::Report,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_space_time_skips_data_path() {
        let passes = required_passes(PassId::SpaceTime);
        assert_eq!(passes, vec![PassId::Validate, PassId::SpaceTime]);
        assert!(!passes.contains(&PassId::Scatter));
        assert!(!passes.contains(&PassId::Buffer));
    }

    #[test]
    fn required_passes_report_includes_all() {
        let passes = required_passes(PassId::Report);
        assert_eq!(passes.len(), 6);
        assert_eq!(passes[0], PassId::Validate);
        assert_eq!(passes[5], PassId::Report);
    }

    #[test]
    fn required_passes_validate_is_minimal() {
        assert_eq!(required_passes(PassId::Validate), vec![PassId::Validate]);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
