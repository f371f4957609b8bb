//! Graph algorithms.
//!
//! All algorithms take a graph through the traits in [`crate::utils::graph`], so they work
//! for any graph view that can enumerate successors.

mod scc;

pub use scc::{condensation, strongly_connected_components};
