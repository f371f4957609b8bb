//! Instruction model shared with the external parser.
//!
//! # Key Components
//!
//! - [`Opcode`] / [`TypeCode`] - NCS opcode and auxiliary type bytes
//! - [`Instruction`] - One decoded instruction with its operands and encoded size
//! - [`ParseTree`] - Arena of instructions grouped into subroutines
//! - [`ParseTreeBuilder`] - Label-based assembler producing positioned trees
//! - [`ActionCatalog`] - Lookup of engine action signatures

mod actions;
mod instruction;
mod opcode;
mod tree;

pub use actions::{ActionCatalog, ActionSignature, ActionTable};
pub use instruction::{Constant, Instruction, Operand, HEADER_SIZE, JUMP_SIZE, SKIP_ONE};
pub use opcode::{Opcode, TypeCode};
pub use tree::{CmdId, Label, ParseTree, ParseTreeBuilder, SubId};
