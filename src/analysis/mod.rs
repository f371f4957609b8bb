//! Program analysis over the instruction tree.
//!
//! This module computes the facts every later stage relies on. Results live in the
//! [`NodeAnalysisData`] side table and in the [`CallGraph`]; the [`crate::bytecode::ParseTree`]
//! stays read-only.
//!
//! # Architecture
//!
//! The passes run in a fixed order, each relying on the previous ones:
//!
//! - [`PositionResolver`] - Records instruction positions and checks that they are ordered
//! - [`JumpResolver`] - Resolves jump and call destinations and registers their origins
//! - [`DeadCodeMarker`] - Marks unreachable code and tags short-circuit jumps
//! - [`CallGraph`] - Caller/callee graph with its strongly connected components
//!
//! [`CallSiteAnalyzer`] and [`stack_effect`] are helpers for the type inference stage.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ncsdecomp::analysis::{CallGraph, DeadCodeMarker, JumpResolver, NodeAnalysisData, PositionResolver};
//!
//! let mut data = NodeAnalysisData::new(tree.command_count());
//! PositionResolver::resolve(&tree, &mut data)?;
//! JumpResolver::resolve(&tree, &mut data)?;
//! DeadCodeMarker::mark(&tree, &mut data)?;
//! let graph = CallGraph::build(&tree, &data)?;
//! for scc in graph.sccs() {
//!     println!("{scc:?}");
//! }
//! ```

mod callgraph;
mod callsites;
mod deadcode;
mod effects;
mod jumps;
mod nodedata;
mod positions;

pub use callgraph::{CallGraph, CallGraphStats};
pub use callsites::CallSiteAnalyzer;
pub use deadcode::DeadCodeMarker;
pub use effects::{
    action_slots, binary_operand_slots, binary_result_slots, stack_effect, StackEffect,
};
pub use jumps::JumpResolver;
pub use nodedata::{CodeState, NodeAnalysisData, StackSnapshot};
pub use positions::PositionResolver;
