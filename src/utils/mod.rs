//! Shared infrastructure used by the analysis passes.
//!
//! - [`graph`] - Directed graphs and strongly connected components

pub mod graph;
