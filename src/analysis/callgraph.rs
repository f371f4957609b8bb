//! Inter-procedural call graph over subroutines.
//!
//! Nodes are subroutines (node index equals the [`SubId`] index), edges are live `JSR`
//! instructions. Calls whose destination is not a subroutine entry are not part of the
//! graph.

use std::{collections::HashMap, sync::OnceLock};

use crate::{
    analysis::NodeAnalysisData,
    bytecode::{CmdId, Opcode, ParseTree, SubId},
    utils::graph::{
        algorithms::{condensation, strongly_connected_components},
        DirectedGraph, NodeId,
    },
    Result,
};

/// Call graph of a program.
///
/// # Example
///
/// ```ignore
/// let graph = CallGraph::build(&tree, &data)?;
/// for scc in graph.sccs() {
///     // callees are always visited before their callers
/// }
/// ```
#[derive(Debug)]
pub struct CallGraph {
    /// Nodes are subroutines, edge payloads the calling `JSR`
    graph: DirectedGraph<SubId, CmdId>,
    /// Subroutine by entry instruction
    entries: HashMap<CmdId, SubId>,
    /// Callee of every live call site
    targets: HashMap<CmdId, SubId>,
    /// Cached SCCs (reverse topological order)
    sccs: OnceLock<Vec<Vec<SubId>>>,
}

impl CallGraph {
    /// Builds the call graph from resolved, liveness-marked instructions.
    ///
    /// # Arguments
    ///
    /// * `tree` - The program
    /// * `data` - Side table with destinations and liveness
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotVisited`] if earlier stages did not run, or
    /// [`crate::Error::GraphError`] on an inconsistent graph.
    pub fn build(tree: &ParseTree, data: &NodeAnalysisData) -> Result<Self> {
        let mut graph = DirectedGraph::with_capacity(tree.subroutine_count());
        let mut entries = HashMap::with_capacity(tree.subroutine_count());
        for sub in tree.subroutines() {
            graph.add_node(sub);
            entries.insert(tree.entry(sub), sub);
        }

        let mut targets = HashMap::new();
        for cmd in tree.commands() {
            if tree.kind(cmd) != Opcode::Jsr || data.is_dead(cmd)? {
                continue;
            }
            let Some(destination) = data.destination(cmd)? else {
                continue;
            };
            let Some(&callee) = entries.get(&destination) else {
                log::debug!(
                    "call at {} targets {} which is not a subroutine entry",
                    data.position(cmd)?,
                    data.position(destination)?
                );
                continue;
            };
            let caller = tree.parent(cmd);
            graph.add_edge(NodeId::new(caller.index()), NodeId::new(callee.index()), cmd)?;
            targets.insert(cmd, callee);
        }

        Ok(CallGraph {
            graph,
            entries,
            targets,
            sccs: OnceLock::new(),
        })
    }

    /// Number of subroutines.
    #[must_use]
    pub fn subroutine_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of call edges, counting every call site.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Callee of the call instruction `cmd`.
    #[must_use]
    pub fn target(&self, cmd: CmdId) -> Option<SubId> {
        self.targets.get(&cmd).copied()
    }

    /// Subroutine entered at `cmd`.
    #[must_use]
    pub fn subroutine_at(&self, cmd: CmdId) -> Option<SubId> {
        self.entries.get(&cmd).copied()
    }

    /// Distinct callees of `caller`, sorted.
    #[must_use]
    pub fn callees(&self, caller: SubId) -> Vec<SubId> {
        let mut callees: Vec<SubId> = self
            .graph
            .successors(NodeId::new(caller.index()))
            .map(|n| SubId::new(n.index()))
            .collect();
        callees.sort();
        callees.dedup();
        callees
    }

    /// Distinct callers of `callee`, sorted.
    #[must_use]
    pub fn callers(&self, callee: SubId) -> Vec<SubId> {
        let mut callers: Vec<SubId> = self
            .graph
            .predecessors(NodeId::new(callee.index()))
            .map(|n| SubId::new(n.index()))
            .collect();
        callers.sort();
        callers.dedup();
        callers
    }

    /// Call sites inside `caller` with their callees, in position order.
    #[must_use]
    pub fn call_sites(&self, caller: SubId) -> Vec<(CmdId, SubId)> {
        let mut sites: Vec<(CmdId, SubId)> = self
            .graph
            .outgoing_edges(NodeId::new(caller.index()))
            .map(|(callee, &cmd)| (cmd, SubId::new(callee.index())))
            .collect();
        sites.sort();
        sites
    }

    /// Strongly connected components, callees first.
    ///
    /// The result is lazily computed and cached on first access.
    #[must_use]
    pub fn sccs(&self) -> &[Vec<SubId>] {
        self.sccs.get_or_init(|| {
            strongly_connected_components(&self.graph)
                .into_iter()
                .map(|scc| {
                    let mut subs: Vec<SubId> =
                        scc.into_iter().map(|n| SubId::new(n.index())).collect();
                    subs.sort();
                    subs
                })
                .collect()
        })
    }

    /// `true` when `sub` calls itself directly or through a cycle.
    #[must_use]
    pub fn is_recursive(&self, sub: SubId) -> bool {
        let node = NodeId::new(sub.index());
        self.graph.has_edge(node, node)
            || self
                .sccs()
                .iter()
                .any(|scc| scc.len() > 1 && scc.contains(&sub))
    }

    /// `true` if any recursion exists in the program.
    #[must_use]
    pub fn has_recursion(&self) -> bool {
        (0..self.subroutine_count()).any(|i| self.is_recursive(SubId::new(i)))
    }

    /// Summary numbers for diagnostics.
    #[must_use]
    pub fn stats(&self) -> CallGraphStats {
        let node_sccs: Vec<Vec<NodeId>> = self
            .sccs()
            .iter()
            .map(|scc| scc.iter().map(|s| NodeId::new(s.index())).collect())
            .collect();
        let (_, condensed) = condensation(&self.graph, &node_sccs);
        CallGraphStats {
            subroutine_count: self.subroutine_count(),
            edge_count: self.edge_count(),
            scc_count: node_sccs.len(),
            condensed_edge_count: condensed.len(),
            recursive_count: (0..self.subroutine_count())
                .filter(|&i| self.is_recursive(SubId::new(i)))
                .count(),
        }
    }
}

/// Call graph summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallGraphStats {
    /// Number of subroutines
    pub subroutine_count: usize,
    /// Number of call sites
    pub edge_count: usize,
    /// Number of strongly connected components
    pub scc_count: usize,
    /// Number of distinct edges between components
    pub condensed_edge_count: usize,
    /// Number of subroutines taking part in recursion
    pub recursive_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bytecode::ParseTreeBuilder, test::marked};

    #[test]
    fn test_sccs_callees_first() {
        // entry -> a -> b -> a, a -> c
        let mut asm = ParseTreeBuilder::new();
        let a = asm.label();
        let b = asm.label();
        let c = asm.label();
        asm.subroutine();
        asm.jsr(a);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(a);
        asm.jsr(b);
        asm.jsr(c);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(b);
        asm.jsr(a);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(c);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = marked(&tree);
        let graph = CallGraph::build(&tree, &data).unwrap();

        let (entry, sa, sb, sc) = (SubId::new(0), SubId::new(1), SubId::new(2), SubId::new(3));
        assert_eq!(graph.callees(sa), vec![sb, sc]);
        assert_eq!(graph.callers(sa), vec![entry, sb]);
        assert_eq!(graph.sccs(), &[vec![sc], vec![sa, sb], vec![entry]]);
        assert!(graph.is_recursive(sa));
        assert!(!graph.is_recursive(sc));
        assert!(graph.has_recursion());

        let stats = graph.stats();
        assert_eq!(stats.edge_count, 4);
        assert_eq!(stats.scc_count, 3);
        assert_eq!(stats.condensed_edge_count, 2);
        assert_eq!(stats.recursive_count, 2);
        assert_eq!(graph.call_sites(sa).len(), 2);
    }

    #[test]
    fn test_self_recursion() {
        let mut asm = ParseTreeBuilder::new();
        let a = asm.label();
        asm.subroutine();
        asm.jsr(a);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(a);
        asm.jsr(a);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = marked(&tree);
        let graph = CallGraph::build(&tree, &data).unwrap();
        assert!(graph.is_recursive(SubId::new(1)));
        assert!(!graph.is_recursive(SubId::new(0)));
    }
}
