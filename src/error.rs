use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two groups. Input errors ([`Error::Malformed`], [`Error::JumpTarget`],
/// [`Error::UnknownOpcode`], [`Error::UnknownType`]) mean the instruction tree handed to the
/// decompiler cannot be trusted and analysis stops. Reconstruction errors
/// ([`Error::StructNesting`], [`Error::Unclassified`], [`Error::Unsupported`]) are raised while a
/// single subroutine is rebuilt; the [`crate::Decompiler`] catches them per subroutine and renders a
/// failure comment in place of the body so the rest of the program still decompiles.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Structurally invalid instruction tree
/// - [`Error::JumpTarget`] - A jump or call whose target is not an instruction boundary
/// - [`Error::UnknownOpcode`] - Opcode byte outside the NCS instruction set
/// - [`Error::UnknownType`] - Auxiliary type byte outside the NCS type table
/// - [`Error::NodeNotVisited`] - Side-table lookup for an instruction that was never positioned
///
/// ## Analysis Errors
/// - [`Error::DecisionLimit`] - Path exploration exceeded the decision cap
/// - [`Error::StackUnderflow`] - Abstract stack popped past its bottom
/// - [`Error::GraphError`] - Call graph construction error
///
/// ## Reconstruction Errors
/// - [`Error::StructNesting`] - Aggregate nested beyond one level
/// - [`Error::Unclassified`] - Control-flow shape the structural rules cannot classify
/// - [`Error::Unsupported`] - Recognised but unsupported construct
///
/// # Examples
///
/// ```rust,ignore
/// use ncsdecomp::{Decompiler, DecompilerConfig, Error};
///
/// match Decompiler::new(&catalog, DecompilerConfig::default()).decompile(&tree) {
///     Ok(program) => println!("{}", program.to_text()),
///     Err(Error::JumpTarget { position, target }) => {
///         eprintln!("jump at {position} targets {target}, which is not an instruction");
///     }
///     Err(e) => eprintln!("decompilation failed: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The instruction tree is damaged and could not be analyzed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A jump or call instruction targets a byte position that is not the start of any
    /// instruction.
    ///
    /// Malformed jump targets are not recoverable: every later stage relies on resolved
    /// destinations.
    #[error("Jump at position {position} targets {target}, which is not an instruction boundary")]
    JumpTarget {
        /// Position of the jump instruction
        position: u32,
        /// Computed target position (`position + offset`)
        target: i64,
    },

    /// Opcode byte is not part of the NCS instruction set.
    #[error("Unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Auxiliary type byte is not part of the NCS type table.
    #[error("Unknown type code 0x{0:02X}")]
    UnknownType(u8),

    /// An instruction was queried from the analysis side table before positions were assigned.
    ///
    /// The associated value is the arena index of the instruction.
    #[error("Instruction {0} was never visited by the position resolver")]
    NodeNotVisited(usize),

    /// Path exploration for a subroutine queued more branch decisions than allowed.
    ///
    /// This bounds backtracking so inference always terminates.
    #[error("Subroutine {sub} exceeded the limit of {limit} queued branch decisions")]
    DecisionLimit {
        /// Arena index of the subroutine
        sub: usize,
        /// The configured decision cap
        limit: usize,
    },

    /// The abstract stack was popped past its bottom while rebuilding code that must be
    /// balanced.
    #[error("Stack underflow at position {position}")]
    StackUnderflow {
        /// Position of the offending instruction
        position: u32,
    },

    /// An aggregate would have to be nested inside another aggregate.
    ///
    /// Only one level of struct grouping is supported.
    #[error("Struct nested beyond one level at position {position}")]
    StructNesting {
        /// Position of the instruction that required the nested grouping
        position: u32,
    },

    /// A control-flow shape could not be classified by the structural recovery rules.
    ///
    /// Raised instead of guessing at a structure; the affected subroutine is reported as a
    /// decompilation failure.
    #[error("Unclassified control flow at position {position}: {message}")]
    Unclassified {
        /// Position of the offending instruction
        position: u32,
        /// Description of the shape that was not recognised
        message: String,
    },

    /// A recognised construct that this decompiler does not rebuild.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Error during call graph construction or traversal.
    #[error("{0}")]
    GraphError(String),
}
