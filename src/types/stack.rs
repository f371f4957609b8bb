//! Abstract operand stacks.
//!
//! Both the type simulator and the reconstructor model the VM stack as a vector of 4-byte
//! slots. NCS addresses slots with negative byte offsets from the top (`-4` is the top
//! slot), so [`SlotStack`] offers offset-addressed access in those terms, plus the two
//! aggregate operations the instruction set needs: taking a contiguous run as a group and
//! destructuring (dropping a region but keeping one element of it).

use std::ops::Range;

use crate::{
    script::{AstId, VarId},
    types::Type,
};

/// A stack of 4-byte slots; index 0 is the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotStack<T> {
    slots: Vec<T>,
}

impl<T> Default for SlotStack<T> {
    fn default() -> Self {
        SlotStack { slots: Vec::new() }
    }
}

impl<T: Clone> SlotStack<T> {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots.
    #[must_use]
    pub fn height(&self) -> usize {
        self.slots.len()
    }

    /// `true` when no slot is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pushes one slot.
    pub fn push(&mut self, value: T) {
        self.slots.push(value);
    }

    /// Pops the top slot.
    pub fn pop(&mut self) -> Option<T> {
        self.slots.pop()
    }

    /// Pops `count` slots, returned deepest first. Returns `None` without popping when fewer
    /// slots are live.
    pub fn pop_n(&mut self, count: usize) -> Option<Vec<T>> {
        let start = self.slots.len().checked_sub(count)?;
        Some(self.slots.split_off(start))
    }

    /// Slot at `depth`, where depth 1 is the top.
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&T> {
        let index = self.slots.len().checked_sub(depth)?;
        if depth == 0 {
            return None;
        }
        self.slots.get(index)
    }

    /// Mutable slot at `depth`, where depth 1 is the top.
    pub fn peek_mut(&mut self, depth: usize) -> Option<&mut T> {
        if depth == 0 {
            return None;
        }
        let index = self.slots.len().checked_sub(depth)?;
        self.slots.get_mut(index)
    }

    /// Index range covered by a copy of `size` bytes starting at byte `offset` from the top.
    ///
    /// Returns `None` when the range is empty, misaligned or reaches below the bottom.
    #[must_use]
    pub fn range(&self, offset: i32, size: u16) -> Option<Range<usize>> {
        if offset >= 0 || offset % 4 != 0 || size == 0 || size % 4 != 0 {
            return None;
        }
        let start = self.slots.len() as i64 + i64::from(offset / 4);
        let end = start + i64::from(size / 4);
        if start < 0 || end > self.slots.len() as i64 {
            return None;
        }
        Some(start as usize..end as usize)
    }

    /// Slots at an index range, deepest first.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> &[T] {
        &self.slots[range]
    }

    /// Slot at a raw index (0 is the bottom).
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    /// Mutable slot at a raw index (0 is the bottom).
    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)
    }

    /// Drops every slot above `height`.
    pub fn truncate(&mut self, height: usize) {
        self.slots.truncate(height);
    }

    /// Removes the top `count` slots but keeps the `keep` slots found `offset` slots into
    /// the removed region (counted from its deepest slot). The kept slots end up on top.
    ///
    /// Returns `false` without changing the stack when the region is invalid.
    pub fn destructure(&mut self, count: usize, offset: usize, keep: usize) -> bool {
        if offset + keep > count || count > self.slots.len() {
            return false;
        }
        let start = self.slots.len() - count;
        let kept: Vec<T> = self.slots[start + offset..start + offset + keep].to_vec();
        self.slots.truncate(start);
        self.slots.extend(kept);
        true
    }

    /// Iterates bottom to top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.slots.iter()
    }
}

/// One slot of the type simulator's stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSlot {
    /// A value of known type
    Known(Type),
    /// A copy of the `n`-th slot below the subroutine entry whose type is not known yet
    BelowEntry(u32),
    /// A value of unknown type with no known origin
    Unknown,
}

impl TypeSlot {
    /// Known type of this slot, if any.
    #[must_use]
    pub fn known(&self) -> Option<&Type> {
        match self {
            TypeSlot::Known(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Type simulator stack.
pub type LocalTypeStack = SlotStack<TypeSlot>;

/// One slot of the reconstructor's stack.
///
/// Entries compare by identity: two `Const` entries are equal only when they are copies of
/// the same pushed literal, and two `Variable` entries are equal when they name the same
/// variable. A multi-slot value occupies several consecutive slots holding the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackEntry {
    /// A literal not yet consumed; `expr` is its expression node
    Const {
        /// Literal expression node
        expr: AstId,
    },
    /// A named or temporary variable
    Variable(VarId),
}

/// Reconstructor stack.
pub type LocalVarStack = SlotStack<StackEntry>;
