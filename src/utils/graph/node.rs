//! Node identifier for directed graphs.
//!
//! [`NodeId`] is a strongly-typed index into a [`DirectedGraph`](crate::utils::graph::DirectedGraph).
//! The newtype prevents accidental confusion between graph node indices and the
//! instruction or subroutine indices of the parse tree.

use std::fmt;

/// A strongly-typed identifier for nodes within a directed graph.
///
/// Node IDs are assigned sequentially starting from 0 when nodes are added to a graph,
/// so they can be used directly to index per-node vectors.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw node index (0-based)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
