// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # ncsdecomp
//!
//! Analysis and structural recovery core for decompiling NWScript NCS bytecode back into
//! readable script source. The crate takes an already parsed instruction tree and an
//! engine action catalog and produces one structured function per subroutine.
//!
//! ## Features
//!
//! - **Jump and liveness analysis** - Resolves every jump, marks dead code and short-circuit jumps
//! - **Prototype inference** - SCC-ordered fixpoint over the call graph with bounded backtracking
//! - **Control-flow recovery** - `if`/`else`, `while`, `do`/`while`, `switch`, `break`,
//!   `continue` and `return` from the compiler's jump shapes
//! - **Globals, vectors and structs** - BP-relative globals, grouped aggregates and member access
//! - **Action closures** - Deferred `STORE_STATE` bodies passed to actions such as `DelayCommand`
//! - **Graceful failure** - A subroutine that cannot be structured renders as a failure comment
//!   while the rest of the program still decompiles
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ncsdecomp::prelude::*;
//!
//! let catalog = ActionTable::new()
//!     .with(1, ActionSignature::new("PrintString", Type::VOID, vec![Type::STRING]));
//!
//! let mut asm = ParseTreeBuilder::new();
//! asm.subroutine()
//!     .emit(Instruction::constant(Constant::String("hello".into())))
//!     .emit(Instruction::action(1, 1))
//!     .simple(Opcode::Retn);
//! let tree = asm.finish()?;
//!
//! let program = Decompiler::new(&catalog, DecompilerConfig::default()).decompile(&tree)?;
//! assert_eq!(program.to_text(), "void main() {\n    PrintString(\"hello\");\n}\n");
//! # Ok::<(), ncsdecomp::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`bytecode`] - Instruction model, parse tree, assembler and action catalog
//! - [`analysis`] - Positions, jump destinations, dead code, stack effects and the call graph
//! - [`inference`] - Program layout and prototype inference
//! - [`reconstruct`] - Per-subroutine control-flow reconstruction
//! - [`cleanup`] - Tree normalization after reconstruction
//! - [`script`] - Script trees, variables and rendering
//! - [`types`] - NWScript types, abstract stack entries and subroutine prototypes
//! - [`decompiler`] - The driver tying the stages together
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Malformed input fails the whole run; a subroutine that cannot be structured is reported
//! per subroutine:
//!
//! ```rust,ignore
//! use ncsdecomp::{Decompiler, DecompilerConfig, Error};
//!
//! match Decompiler::new(&catalog, DecompilerConfig::default()).decompile(&tree) {
//!     Ok(program) => {
//!         for sub in program.subroutines.iter().filter(|s| s.is_failed()) {
//!             eprintln!("{}: {:?}", sub.name, sub.error);
//!         }
//!     }
//!     Err(Error::JumpTarget { position, .. }) => eprintln!("bad jump at {position}"),
//!     Err(e) => eprintln!("decompilation failed: {e}"),
//! }
//! ```
//!
//! ## Logging
//!
//! Progress and recoverable substitutions are reported through the [`log`] facade. The
//! library never installs a logger.

#[macro_use]
pub(crate) mod error;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust,ignore
/// use ncsdecomp::prelude::*;
/// ```
pub mod prelude;

/// Per-instruction analysis passes and the call graph.
pub mod analysis;

/// Instructions, parse trees and the engine action catalog.
pub mod bytecode;

/// Script tree normalization.
pub mod cleanup;

/// Decompiler configuration.
pub mod config;

/// The decompilation driver.
pub mod decompiler;

/// Program layout and prototype inference.
pub mod inference;

/// Control-flow reconstruction.
pub mod reconstruct;

/// Reconstructed script trees and their rendering.
pub mod script;

/// NWScript types and subroutine prototypes.
pub mod types;

/// `ncsdecomp` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ncsdecomp` Error type
///
/// See [`Error`] for the input, analysis and reconstruction error categories.
pub use error::Error;

/// Configuration of a decompiler run.
pub use config::DecompilerConfig;

/// Main entry point for decompiling a parse tree.
pub use decompiler::{DecompiledProgram, DecompiledSubroutine, Decompiler, ProgramAnalysis};
