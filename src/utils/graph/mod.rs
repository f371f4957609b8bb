//! Generic directed graph infrastructure for program analysis.
//!
//! The graph module is organized into several components:
//!
//! - **Core Types**: [`NodeId`] and [`DirectedGraph`] provide the fundamental building
//!   blocks for graph representation
//! - **Algorithms**: strongly connected components and their condensation
//! - **Traits**: Abstraction traits enabling algorithms to work with different graph types
//!
//! Graphs are built incrementally during construction, then treated as immutable for
//! analysis.

pub mod algorithms;
mod directed;
mod node;
mod traits;

pub use directed::DirectedGraph;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, Successors};
