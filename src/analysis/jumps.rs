//! Jump target resolution.
//!
//! Every `JMP`, `JSR`, `JZ` and `JNZ` carries a relative byte offset. The resolver turns it
//! into the destination instruction and records the reverse edge on the destination.
//!
//! Origins are kept for every jump kind, calls included. Instructions targeted by a call or
//! any branch count as reachable to dead-code marking, while loop recovery and step
//! folding filter the list by opcode and position themselves.

use crate::{
    analysis::NodeAnalysisData,
    bytecode::{CmdId, ParseTree},
    Error, Result,
};

/// Resolves jump and call destinations.
pub struct JumpResolver;

impl JumpResolver {
    /// Resolves every jump-shaped instruction of `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JumpTarget`] when a computed target is not the position of any
    /// instruction, and [`Error::NodeNotVisited`] when positions were not resolved first.
    pub fn resolve(tree: &ParseTree, data: &mut NodeAnalysisData) -> Result<()> {
        for cmd in tree.commands() {
            let Some(offset) = tree.instruction(cmd).jump_offset() else {
                continue;
            };
            let position = data.position(cmd)?;
            let target = i64::from(position) + i64::from(offset);
            let destination = Self::find(tree, data, target)?.ok_or(Error::JumpTarget {
                position,
                target,
            })?;
            data.set_destination(cmd, destination)?;
            data.add_origin(destination, cmd)?;
        }
        Ok(())
    }

    /// Finds the instruction at byte position `target`.
    ///
    /// Bisects over subroutine entries first, then over the commands of the selected
    /// subroutine. The descent is bounded by the number of halvings either list allows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] when positions were not resolved first.
    pub fn find(tree: &ParseTree, data: &NodeAnalysisData, target: i64) -> Result<Option<CmdId>> {
        let subs: Vec<_> = tree.subroutines().collect();
        if subs.is_empty() || target < 0 {
            return Ok(None);
        }

        // Last subroutine whose entry is <= target.
        let (mut lo, mut hi) = (0usize, subs.len());
        let mut budget = bisection_budget(subs.len());
        while lo + 1 < hi && budget > 0 {
            let mid = (lo + hi) / 2;
            if i64::from(data.position(tree.entry(subs[mid]))?) <= target {
                lo = mid;
            } else {
                hi = mid;
            }
            budget -= 1;
        }

        let commands = tree.children(subs[lo]);
        let (mut lo, mut hi) = (0usize, commands.len());
        let mut budget = bisection_budget(commands.len());
        while lo < hi && budget > 0 {
            let mid = (lo + hi) / 2;
            let position = i64::from(data.position(commands[mid])?);
            match position.cmp(&target) {
                std::cmp::Ordering::Equal => return Ok(Some(commands[mid])),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
            budget -= 1;
        }
        Ok(None)
    }
}

fn bisection_budget(len: usize) -> u32 {
    usize::BITS - len.leading_zeros() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::PositionResolver,
        bytecode::{Instruction, Opcode, ParseTreeBuilder, TypeCode},
    };

    fn resolved(tree: &ParseTree) -> Result<NodeAnalysisData> {
        let mut data = NodeAnalysisData::new(tree.command_count());
        PositionResolver::resolve(tree, &mut data)?;
        JumpResolver::resolve(tree, &mut data)?;
        Ok(data)
    }

    #[test]
    fn test_forward_backward_and_call_targets() {
        let mut asm = ParseTreeBuilder::new();
        let sub = asm.label();
        let top = asm.label();
        let end = asm.label();
        asm.subroutine();
        asm.jsr(sub);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(sub);
        asm.place(top);
        asm.emit(Instruction::constant(crate::bytecode::Constant::Int(1)));
        asm.jz(end);
        asm.jmp(top);
        asm.place(end);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = resolved(&tree).unwrap();

        let jsr = CmdId::new(0);
        let entry = CmdId::new(2);
        let jz = CmdId::new(3);
        let jmp = CmdId::new(4);
        let retn = CmdId::new(5);
        assert_eq!(data.destination(jsr).unwrap(), Some(entry));
        assert_eq!(data.destination(jz).unwrap(), Some(retn));
        assert_eq!(data.destination(jmp).unwrap(), Some(entry));
        assert_eq!(data.origins(entry).unwrap(), &[jsr, jmp]);
        assert_eq!(data.origins(retn).unwrap(), &[jz]);
    }

    #[test]
    fn test_target_between_instructions() {
        let tree = ParseTree::from_subroutines(vec![vec![
            (13, Instruction::jump(Opcode::Jmp, 3)),
            (19, Instruction::simple(Opcode::Retn, TypeCode::Void)),
        ]])
        .unwrap();
        assert_eq!(
            resolved(&tree).unwrap_err(),
            Error::JumpTarget {
                position: 13,
                target: 16
            }
        );
    }

    #[test]
    fn test_find_every_position() {
        let mut asm = ParseTreeBuilder::new();
        for _ in 0..5 {
            asm.subroutine();
            for _ in 0..7 {
                asm.simple(Opcode::Nop);
            }
        }
        let tree = asm.finish().unwrap();
        let data = resolved(&tree).unwrap();
        for cmd in tree.commands() {
            let position = i64::from(tree.position(cmd));
            assert_eq!(JumpResolver::find(&tree, &data, position).unwrap(), Some(cmd));
            assert_eq!(JumpResolver::find(&tree, &data, position + 1).unwrap(), None);
        }
        assert_eq!(JumpResolver::find(&tree, &data, 0).unwrap(), None);
    }
}
