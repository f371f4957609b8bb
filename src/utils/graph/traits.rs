//! Graph abstraction traits.
//!
//! Algorithms in [`crate::utils::graph::algorithms`] are written against these traits
//! instead of a concrete graph type.

use crate::utils::graph::NodeId;

/// Basic node enumeration shared by all graph views.
pub trait GraphBase {
    /// Number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Iterator over every node identifier, in insertion order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward adjacency.
pub trait Successors: GraphBase {
    /// Nodes that are targets of edges leaving `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward adjacency.
pub trait Predecessors: GraphBase {
    /// Nodes that are sources of edges entering `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}
