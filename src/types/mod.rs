//! Type model: value types, abstract stacks and subroutine prototypes.

mod stack;
mod subroutine;
mod ty;

pub use stack::{LocalTypeStack, LocalVarStack, SlotStack, StackEntry, TypeSlot};
pub use subroutine::{Decision, DecisionQueue, ProtoStatus, SubroutineFlags, SubroutineState};
pub use ty::{StructType, StructTable, Type};
