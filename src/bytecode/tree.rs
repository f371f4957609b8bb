//! The instruction tree handed to the decompiler.
//!
//! [`ParseTree`] is the boundary with the external parser: an arena of instruction nodes
//! grouped into subroutines. Nodes are addressed by [`CmdId`] and subroutines by
//! [`SubId`]; both are plain indices, so every analysis result can live in a side table
//! keyed by them instead of on the nodes themselves.
//!
//! [`ParseTreeBuilder`] is a small label-based assembler producing a tree with positions
//! assigned by the NCS size rules. Parsers and tests use it alike.

use std::fmt;

use crate::{
    bytecode::{Instruction, Opcode, HEADER_SIZE},
    Result,
};

/// Arena index of an instruction node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CmdId(pub(crate) usize);

impl CmdId {
    /// Creates a `CmdId` from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        CmdId(index)
    }

    /// The raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CmdId({})", self.0)
    }
}

/// Arena index of a subroutine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubId(pub(crate) usize);

impl SubId {
    /// Creates a `SubId` from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        SubId(index)
    }

    /// The raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubId({})", self.0)
    }
}

#[derive(Debug, Clone)]
struct CommandNode {
    instruction: Instruction,
    position: u32,
    parent: SubId,
}

/// An already-parsed NCS program.
///
/// Subroutines are stored in position order and every subroutine owns a contiguous,
/// position-ordered run of commands. The first subroutine is the program entry stub
/// (or the globals initializer when the program declares globals).
#[derive(Debug, Clone, Default)]
pub struct ParseTree {
    commands: Vec<CommandNode>,
    subroutines: Vec<Vec<CmdId>>,
}

impl ParseTree {
    /// Builds a tree from explicitly positioned subroutines.
    ///
    /// # Arguments
    ///
    /// * `subroutines` - For each subroutine, its `(position, instruction)` pairs in order
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when a subroutine is empty.
    pub fn from_subroutines(subroutines: Vec<Vec<(u32, Instruction)>>) -> Result<Self> {
        let mut tree = ParseTree::default();
        for (sub_index, commands) in subroutines.into_iter().enumerate() {
            if commands.is_empty() {
                return Err(malformed_error!("subroutine {} has no instructions", sub_index));
            }
            let sub = SubId::new(sub_index);
            let mut children = Vec::with_capacity(commands.len());
            for (position, instruction) in commands {
                let cmd = CmdId::new(tree.commands.len());
                tree.commands.push(CommandNode {
                    instruction,
                    position,
                    parent: sub,
                });
                children.push(cmd);
            }
            tree.subroutines.push(children);
        }
        Ok(tree)
    }

    /// Byte position of `cmd` as reported by the parser.
    #[must_use]
    pub fn position(&self, cmd: CmdId) -> u32 {
        self.commands[cmd.0].position
    }

    /// Opcode of `cmd`.
    #[must_use]
    pub fn kind(&self, cmd: CmdId) -> Opcode {
        self.commands[cmd.0].instruction.opcode
    }

    /// Decoded instruction of `cmd`.
    #[must_use]
    pub fn instruction(&self, cmd: CmdId) -> &Instruction {
        &self.commands[cmd.0].instruction
    }

    /// Subroutine owning `cmd`.
    #[must_use]
    pub fn parent(&self, cmd: CmdId) -> SubId {
        self.commands[cmd.0].parent
    }

    /// Commands of `sub` in position order.
    #[must_use]
    pub fn children(&self, sub: SubId) -> &[CmdId] {
        &self.subroutines[sub.0]
    }

    /// First command of `sub`.
    #[must_use]
    pub fn entry(&self, sub: SubId) -> CmdId {
        self.subroutines[sub.0][0]
    }

    /// All subroutines in position order.
    pub fn subroutines(&self) -> impl Iterator<Item = SubId> + '_ {
        (0..self.subroutines.len()).map(SubId::new)
    }

    /// All commands in position order.
    pub fn commands(&self) -> impl Iterator<Item = CmdId> + '_ {
        (0..self.commands.len()).map(CmdId::new)
    }

    /// Number of subroutines.
    #[must_use]
    pub fn subroutine_count(&self) -> usize {
        self.subroutines.len()
    }

    /// Number of commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Command following `cmd` inside the same subroutine.
    #[must_use]
    pub fn next_in_sub(&self, cmd: CmdId) -> Option<CmdId> {
        let next = CmdId::new(cmd.0 + 1);
        (next.0 < self.commands.len() && self.commands[next.0].parent == self.commands[cmd.0].parent)
            .then_some(next)
    }

    /// Command preceding `cmd` inside the same subroutine.
    #[must_use]
    pub fn prev_in_sub(&self, cmd: CmdId) -> Option<CmdId> {
        let prev = cmd.0.checked_sub(1)?;
        (self.commands[prev].parent == self.commands[cmd.0].parent).then_some(CmdId::new(prev))
    }
}

/// A forward or backward reference to an instruction inside a [`ParseTreeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone)]
enum Pending {
    Fixed(Instruction),
    Jump(Opcode, Label),
}

/// Label-based assembler for [`ParseTree`]s.
///
/// Jumps reference [`Label`]s that are placed later (or earlier); [`ParseTreeBuilder::finish`]
/// assigns positions starting after the NCS header and patches every jump offset.
///
/// # Examples
///
/// ```rust,ignore
/// use ncsdecomp::bytecode::{Instruction, Opcode, ParseTreeBuilder};
///
/// let mut asm = ParseTreeBuilder::new();
/// let main = asm.label();
/// asm.subroutine();
/// asm.jsr(main);
/// asm.simple(Opcode::Retn);
/// asm.subroutine_at(main);
/// asm.simple(Opcode::Retn);
/// let tree = asm.finish()?;
/// assert_eq!(tree.subroutine_count(), 2);
/// # Ok::<(), ncsdecomp::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ParseTreeBuilder {
    subroutines: Vec<Vec<Pending>>,
    /// For each label, the global instruction index it was placed before
    labels: Vec<Option<usize>>,
    emitted: usize,
}

impl ParseTreeBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new, unplaced label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Places `label` before the next emitted instruction.
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.emitted);
        self
    }

    /// Starts a new subroutine.
    pub fn subroutine(&mut self) -> &mut Self {
        self.subroutines.push(Vec::new());
        self
    }

    /// Starts a new subroutine whose entry is `label`.
    pub fn subroutine_at(&mut self, label: Label) -> &mut Self {
        self.subroutine();
        self.place(label)
    }

    /// Emits an instruction with fixed operands.
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.push(Pending::Fixed(instruction))
    }

    /// Emits an operand-less instruction with no type byte (`RETN`, `SAVEBP`, ...).
    pub fn simple(&mut self, opcode: Opcode) -> &mut Self {
        self.emit(Instruction::simple(opcode, crate::bytecode::TypeCode::Void))
    }

    /// Emits a jump-shaped instruction to `label`.
    pub fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.push(Pending::Jump(opcode, label))
    }

    /// `JMP label`
    pub fn jmp(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jmp, label)
    }

    /// `JZ label`
    pub fn jz(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jz, label)
    }

    /// `JNZ label`
    pub fn jnz(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jnz, label)
    }

    /// `JSR label`
    pub fn jsr(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jsr, label)
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emitted
    }

    /// `true` when nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitted == 0
    }

    fn push(&mut self, pending: Pending) -> &mut Self {
        if self.subroutines.is_empty() {
            self.subroutines.push(Vec::new());
        }
        if let Some(sub) = self.subroutines.last_mut() {
            sub.push(pending);
        }
        self.emitted += 1;
        self
    }

    /// Assigns positions, resolves labels and produces the tree.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when a referenced label was never placed, was
    /// placed past the last instruction, or a subroutine is empty.
    pub fn finish(self) -> Result<ParseTree> {
        let mut positions = Vec::with_capacity(self.emitted);
        let mut position = HEADER_SIZE;
        for pending in self.subroutines.iter().flatten() {
            positions.push(position);
            position += match pending {
                Pending::Fixed(instruction) => instruction.size(),
                Pending::Jump(..) => crate::bytecode::JUMP_SIZE,
            };
        }

        let resolve = |label: Label| -> Result<u32> {
            let index = self.labels[label.0]
                .ok_or_else(|| malformed_error!("label {} was never placed", label.0))?;
            positions
                .get(index)
                .copied()
                .ok_or_else(|| malformed_error!("label {} is placed past the end", label.0))
        };

        let mut index = 0;
        let mut subroutines = Vec::with_capacity(self.subroutines.len());
        for sub in &self.subroutines {
            let mut commands = Vec::with_capacity(sub.len());
            for pending in sub {
                let position = positions[index];
                let instruction = match pending {
                    Pending::Fixed(instruction) => instruction.clone(),
                    Pending::Jump(opcode, label) => {
                        let target = resolve(*label)?;
                        Instruction::jump(*opcode, target as i32 - position as i32)
                    }
                };
                commands.push((position, instruction));
                index += 1;
            }
            subroutines.push(commands);
        }

        ParseTree::from_subroutines(subroutines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Constant, TypeCode};

    #[test]
    fn test_builder_positions_and_offsets() {
        let mut asm = ParseTreeBuilder::new();
        let main = asm.label();
        asm.subroutine();
        asm.jsr(main);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(main);
        asm.emit(Instruction::constant(Constant::String("hi".into())));
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        assert_eq!(tree.subroutine_count(), 2);
        assert_eq!(tree.command_count(), 5);
        assert_eq!(tree.position(CmdId::new(0)), 13);
        assert_eq!(tree.position(CmdId::new(1)), 19);
        assert_eq!(tree.position(CmdId::new(2)), 21);
        assert_eq!(tree.position(CmdId::new(3)), 27);
        assert_eq!(tree.instruction(CmdId::new(0)).jump_offset(), Some(8));

        let main_sub = SubId::new(1);
        assert_eq!(tree.entry(main_sub), CmdId::new(2));
        assert_eq!(tree.parent(CmdId::new(4)), main_sub);
        assert_eq!(tree.children(main_sub).len(), 3);
    }

    #[test]
    fn test_builder_backward_label() {
        let mut asm = ParseTreeBuilder::new();
        let top = asm.label();
        asm.subroutine();
        asm.place(top);
        asm.emit(Instruction::rsadd(TypeCode::Int));
        asm.jmp(top);
        let tree = asm.finish().unwrap();
        assert_eq!(tree.instruction(CmdId::new(1)).jump_offset(), Some(-2));
    }

    #[test]
    fn test_builder_unplaced_label() {
        let mut asm = ParseTreeBuilder::new();
        let nowhere = asm.label();
        asm.subroutine();
        asm.jmp(nowhere);
        assert!(matches!(asm.finish(), Err(crate::Error::Malformed { .. })));
    }

    #[test]
    fn test_sibling_navigation() {
        let mut asm = ParseTreeBuilder::new();
        asm.subroutine();
        asm.simple(Opcode::Retn);
        asm.subroutine();
        asm.simple(Opcode::Nop);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        assert_eq!(tree.next_in_sub(CmdId::new(0)), None);
        assert_eq!(tree.prev_in_sub(CmdId::new(1)), None);
        assert_eq!(tree.next_in_sub(CmdId::new(1)), Some(CmdId::new(2)));
        assert_eq!(tree.prev_in_sub(CmdId::new(2)), Some(CmdId::new(1)));
    }
}
