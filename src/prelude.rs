//! # ncsdecomp Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the ncsdecomp library. Import this module to get quick access to the essential
//! types for decompiling NCS programs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ncsdecomp operations
pub use crate::Error;

/// The result type used throughout ncsdecomp
pub use crate::Result;

/// Configuration of a decompiler run
pub use crate::DecompilerConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Whole-program driver and its results
pub use crate::decompiler::{
    DecompiledProgram, DecompiledSubroutine, Decompiler, ProgramAnalysis, DECOMPILE_FAILED,
};

// ================================================================================================
// Input Model
// ================================================================================================

/// Instructions, parse trees and the assembler
pub use crate::bytecode::{
    CmdId, Constant, Instruction, Label, Opcode, ParseTree, ParseTreeBuilder, SubId, TypeCode,
};

/// Engine action signatures
pub use crate::bytecode::{ActionCatalog, ActionSignature, ActionTable};

// ================================================================================================
// Types and Prototypes
// ================================================================================================

/// NWScript value types and named aggregates
pub use crate::types::{StructTable, Type};

/// Inferred subroutine prototypes
pub use crate::types::{ProtoStatus, SubroutineFlags, SubroutineState};

// ================================================================================================
// Pipeline Stages
// ================================================================================================

/// Analysis passes
pub use crate::analysis::{
    CallGraph, CodeState, DeadCodeMarker, JumpResolver, NodeAnalysisData, PositionResolver,
};

/// Layout detection and type inference
pub use crate::inference::{ProgramLayout, TypeInference, TypeInferenceEngine};

/// Reconstruction and cleanup
pub use crate::{
    cleanup::CleanupPass,
    reconstruct::{ControlFlowReconstructor, ReconstructContext},
};

// ================================================================================================
// Script Trees
// ================================================================================================

/// Reconstructed trees and expression rendering
pub use crate::script::{
    AstId, ExpressionFormatter, Node, ScriptKind, ScriptTree, Signature, VarId, VarKind, Variable,
};
