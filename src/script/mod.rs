//! Reconstructed script source.
//!
//! The control-flow reconstructor builds one [`ScriptTree`] per subroutine: an arena of
//! [`Node`]s (statements and expressions in one tagged union) plus the [`VarTable`] of the
//! variables they reference. The cleanup pass normalizes the tree in place and
//! [`ScriptTree::to_text`] renders it, using [`ExpressionFormatter`] for expressions.
//!
//! # Key Components
//!
//! - [`Node`] / [`AstId`] - Node kinds and arena handles
//! - [`Variable`] / [`VarTable`] / [`VarId`] - Locals, parameters, globals and temporaries
//! - [`ScriptTree`] - Per-subroutine arena with attach/detach operations
//! - [`ExpressionFormatter`] - Precedence-aware expression printer

mod ast;
mod format;
mod render;
mod tree;
mod vars;

pub use ast::{AstId, BinaryOp, Body, LogicalOp, Node, Precedence, StepOp, UnaryOp};
pub use format::ExpressionFormatter;
pub use tree::{ScriptKind, ScriptTree, Signature};
pub use vars::{VarId, VarKind, VarTable, Variable};
