//! Core directed graph implementation.
//!
//! This module provides [`DirectedGraph`], an adjacency-list graph with typed node data
//! and typed edge data. The call graph over subroutines is built on top of it.

use crate::{
    utils::graph::{GraphBase, NodeId, Predecessors, Successors},
    Error, Result,
};

/// A single edge with its endpoints and payload.
#[derive(Debug, Clone)]
struct EdgeData<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with node payloads of type `N` and edge payloads of type `E`.
///
/// Nodes are addressed by [`NodeId`] and assigned sequentially. Parallel edges are
/// allowed; callers that need a simple graph check [`DirectedGraph::has_edge`] first.
///
/// # Examples
///
/// ```rust,ignore
/// use ncsdecomp::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// graph.add_edge(a, b, ())?;
///
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// assert_eq!(graph.predecessors(b).collect::<Vec<_>>(), vec![a]);
/// # Ok::<(), ncsdecomp::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    /// Node data storage
    nodes: Vec<N>,
    /// Edge data storage
    edges: Vec<EdgeData<E>>,
    /// Outgoing edges per node (indices into `edges`)
    outgoing: Vec<Vec<usize>>,
    /// Incoming edges per node (indices into `edges`)
    incoming: Vec<Vec<usize>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates a new empty directed graph.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates an empty graph with room for `node_capacity` nodes.
    #[must_use]
    pub fn with_capacity(node_capacity: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::new(),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
        }
    }

    /// Adds a node and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either `source` or `target` node does not exist
    /// in the graph.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<()> {
        for (role, node) in [("source", source), ("target", target)] {
            if node.index() >= self.nodes.len() {
                return Err(Error::GraphError(format!(
                    "{} node {} does not exist in graph with {} nodes",
                    role,
                    node,
                    self.nodes.len()
                )));
            }
        }

        let id = self.edges.len();
        self.edges.push(EdgeData {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        Ok(())
    }

    /// Returns the data of `node`, if it exists.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Iterates over `(id, data)` pairs of all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i), n))
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges, counting parallel edges separately.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` when at least one edge `source -> target` exists.
    #[must_use]
    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.outgoing
            .get(source.index())
            .is_some_and(|out| out.iter().any(|&e| self.edges[e].target == target))
    }

    /// Iterates over the payloads of edges leaving `node` together with their targets.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, &E)> + '_ {
        self.outgoing[node.index()]
            .iter()
            .map(|&e| (self.edges[e].target, &self.edges[e].data))
    }

    /// Successor nodes of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a valid node in the graph.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing[node.index()]
            .iter()
            .map(|&e| self.edges[e].target)
    }

    /// Predecessor nodes of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a valid node in the graph.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming[node.index()]
            .iter()
            .map(|&e| self.edges[e].source)
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        DirectedGraph::successors(self, node)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        DirectedGraph::predecessors(self, node)
    }
}
