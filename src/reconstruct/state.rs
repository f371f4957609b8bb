//! Reconstructor state machine.

use crate::{
    bytecode::Constant,
    script::{AstId, VarId},
    types::StackEntry,
};

/// What the reconstructor expects from the next instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReconstructState {
    /// Plain statement code
    #[default]
    Normal,
    /// A value was copied down into a variable; the next `MOVSP` ends the assignment
    InAssignmentTail,
    /// Inside the body of a deferred action argument
    InActionArgCapture,
    /// A while loop was opened; its condition ends at the conditional jump to its end
    InWhileCondition,
    /// Collecting `JNZ` case dispatches of a switch
    InSwitchCases,
    /// An increment statement was emitted; a following copy of the same variable turns it
    /// into a prefix expression
    InPrefixStackOp,
    /// The subroutine is complete
    Done,
}

impl ReconstructState {
    /// `true` for states that only last one instruction.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ReconstructState::InAssignmentTail | ReconstructState::InPrefixStackOp
        )
    }
}

/// An open root-bearing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scope {
    /// Node receiving statements
    pub node: AstId,
    /// Stack height when the node was opened
    pub height: usize,
}

/// The last `EQUAL` result, kept to recognise switch dispatches.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Compare {
    /// Temporary holding the comparison result
    pub result: VarId,
    /// Entry compared against the literal
    pub subject: StackEntry,
    /// The literal
    pub label: Constant,
}

/// Case dispatches collected so far for one switch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dispatch {
    /// Entry switched on
    pub subject: StackEntry,
    /// `(label, case position)` in dispatch order
    pub cases: Vec<(Constant, u32)>,
}

/// Bookkeeping for the `++`/`--` idioms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepTracking {
    /// The last instruction copied `source` into the temporary `temp`
    Copied {
        /// Temporary on top of the stack
        temp: VarId,
        /// Variable it was copied from
        source: VarId,
    },
    /// The last instruction emitted `statement`, an increment of `target`
    Stepped {
        /// The emitted expression statement
        statement: AstId,
        /// Incremented variable
        target: VarId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_states() {
        assert!(ReconstructState::InAssignmentTail.is_transient());
        assert!(ReconstructState::InPrefixStackOp.is_transient());
        assert!(!ReconstructState::InWhileCondition.is_transient());
        assert_eq!(ReconstructState::default(), ReconstructState::Normal);
    }
}
