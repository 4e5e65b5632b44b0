//! Schema Graph Cycle Analysis
//!
//! Computes strongly connected components over the reference graph. The
//! model-building engine consults the result when expansion reaches a node
//! that is part of a cycle and must fall back to a named reference; the graph
//! export binary reports the groups.

use petgraph::algo::kosaraju_scc;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Pointer, SchemaGraph};

// =============================================================================
// SCC Group
// =============================================================================

/// A strongly connected component (cycle group) in the reference graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SccGroup {
    /// Stable identifier, assigned after sorting groups by first member
    pub id: usize,
    /// Definition pointers in this group, lexicographically sorted
    pub members: Vec<Pointer>,
    /// Single definition referencing itself
    pub is_self_referential: bool,
}

// =============================================================================
// Analysis Result
// =============================================================================

/// Complete cycle analysis for a schema graph
///
/// Only genuine cycles appear: a single-member SCC is included only when the
/// definition references itself. Acyclic definitions have no entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SccAnalysis {
    /// All cycle groups, ordered by first member pointer
    pub groups: Vec<SccGroup>,
    /// Membership: definition pointer -> index into `groups`
    membership: HashMap<Pointer, usize>,
}

impl SccAnalysis {
    /// Whether a definition participates in any cycle
    pub fn is_cyclic(&self, pointer: &str) -> bool {
        self.membership.contains_key(pointer)
    }

    /// The cycle group a definition belongs to
    pub fn group_of(&self, pointer: &str) -> Option<&SccGroup> {
        self.membership.get(pointer).map(|&id| &self.groups[id])
    }

    /// Number of cycle groups
    pub fn cycle_count(&self) -> usize {
        self.groups.len()
    }

    /// Every definition that is part of some cycle, sorted
    pub fn cyclic_definitions(&self) -> Vec<&Pointer> {
        let mut out: Vec<&Pointer> = self.membership.keys().collect();
        out.sort();
        out
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Compute cycle analysis for a schema graph
pub fn compute_scc_analysis(graph: &SchemaGraph) -> SccAnalysis {
    let sccs = kosaraju_scc(&graph.graph);

    let mut groups = Vec::new();
    for scc in sccs {
        if scc.len() == 1 {
            let idx = scc[0];
            let has_self_edge = graph
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .any(|e| e.target() == idx);
            if !has_self_edge {
                continue;
            }
            if let Some(pointer) = graph.graph.node_weight(idx) {
                groups.push(SccGroup {
                    id: 0,
                    members: vec![pointer.clone()],
                    is_self_referential: true,
                });
            }
        } else {
            let mut members: Vec<Pointer> = scc
                .iter()
                .filter_map(|idx| graph.graph.node_weight(*idx).cloned())
                .collect();
            members.sort();
            groups.push(SccGroup {
                id: 0,
                members,
                is_self_referential: false,
            });
        }
    }

    // kosaraju emits components in reverse topological order of the
    // condensation, which varies with insertion order; sort for stable ids
    groups.sort_by(|a, b| a.members[0].cmp(&b.members[0]));
    let mut membership = HashMap::new();
    for (id, group) in groups.iter_mut().enumerate() {
        group.id = id;
        for member in &group.members {
            membership.insert(member.clone(), id);
        }
    }

    tracing::debug!(cycles = groups.len(), "cycle analysis complete");

    SccAnalysis { groups, membership }
}
