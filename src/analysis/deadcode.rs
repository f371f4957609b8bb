//! Liveness marking.
//!
//! An instruction is live when execution can reach it: by falling through from a live
//! instruction that does not end the flow, or through a live jump or call. Liveness is
//! computed by repeated linear walks in position order until no instruction changes.
//! Each walk carries the current liveness state: an instruction with a live origin turns
//! the state live, and an unconditional jump or return turns it dead for what follows.
//! A marked `JMP` directly after `STORE_STATE` does not end the flow, since the saved
//! state later resumes in the closure body behind it.
//!
//! Dead jumps and calls are then unlinked: their edge is moved from the destination's
//! origins into the dead origins table, so later stages only see live edges.
//!
//! Finally the short-circuit idiom `CPTOPSP -4 4; JZ L; ...; LOGANDII; L:` (and the `JNZ` /
//! `LOGORII` form) is recognised and its conditional jump tagged [`CodeState::LogOr`].

use crate::{
    analysis::{CodeState, NodeAnalysisData},
    bytecode::{CmdId, Opcode, ParseTree},
    Result,
};

/// Marks instructions live, dead or short-circuit.
pub struct DeadCodeMarker;

impl DeadCodeMarker {
    /// Runs liveness marking over the whole program.
    ///
    /// The first instruction of the first subroutine is the program entry and is always
    /// live.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotVisited`] when positions and jumps were not resolved
    /// first.
    pub fn mark(tree: &ParseTree, data: &mut NodeAnalysisData) -> Result<()> {
        let live = Self::live_set(tree, data)?;

        let mut dead_jumps = 0usize;
        for cmd in tree.commands() {
            if live[cmd.index()] {
                data.set_state(cmd, CodeState::Normal)?;
                continue;
            }
            match data.destination(cmd)? {
                Some(destination) => {
                    data.kill_origin(destination, cmd)?;
                    data.set_state(cmd, CodeState::DeadProcess)?;
                    dead_jumps += 1;
                }
                None => data.set_state(cmd, CodeState::Dead)?,
            }
        }

        let mut short_circuits = 0usize;
        for cmd in tree.commands() {
            if live[cmd.index()] && Self::is_short_circuit(tree, data, cmd)? {
                data.set_state(cmd, CodeState::LogOr)?;
                short_circuits += 1;
            }
        }

        log::debug!(
            "liveness: {} of {} instructions dead, {} dead jumps unlinked, {} short-circuit jumps",
            live.iter().filter(|l| !**l).count(),
            live.len(),
            dead_jumps,
            short_circuits
        );
        Ok(())
    }

    fn live_set(tree: &ParseTree, data: &NodeAnalysisData) -> Result<Vec<bool>> {
        let mut live = vec![false; tree.command_count()];
        let program_entry = tree.subroutines().next().map(|sub| tree.entry(sub));

        loop {
            let mut changed = false;
            for sub in tree.subroutines() {
                let mut state = false;
                let mut previous: Option<Opcode> = None;
                for &cmd in tree.children(sub) {
                    let reached = state
                        || Some(cmd) == program_entry
                        || data.origins(cmd)?.iter().any(|o| live[o.index()]);
                    if reached && !live[cmd.index()] {
                        live[cmd.index()] = true;
                        changed = true;
                    }

                    let kind = tree.kind(cmd);
                    let ends_flow = match kind {
                        Opcode::Retn => true,
                        Opcode::Jmp => previous != Some(Opcode::StoreState),
                        _ => false,
                    };
                    state = live[cmd.index()] && !ends_flow;
                    previous = Some(kind);
                }
            }
            if !changed {
                return Ok(live);
            }
        }
    }

    fn is_short_circuit(tree: &ParseTree, data: &NodeAnalysisData, cmd: CmdId) -> Result<bool> {
        let combiner = match tree.kind(cmd) {
            Opcode::Jz => Opcode::LogAnd,
            Opcode::Jnz => Opcode::LogOr,
            _ => return Ok(false),
        };

        let copies_top = tree.prev_in_sub(cmd).is_some_and(|prev| {
            tree.kind(prev) == Opcode::CpTopSp
                && tree.instruction(prev).stack_operand() == Some((-4, 4))
        });
        if !copies_top {
            return Ok(false);
        }

        let Some(destination) = data.destination(cmd)? else {
            return Ok(false);
        };
        Ok(tree
            .prev_in_sub(destination)
            .is_some_and(|before| tree.kind(before) == combiner && before > cmd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{JumpResolver, PositionResolver},
        bytecode::{Constant, Instruction, ParseTreeBuilder, TypeCode},
    };

    fn marked(tree: &ParseTree) -> NodeAnalysisData {
        let mut data = NodeAnalysisData::new(tree.command_count());
        PositionResolver::resolve(tree, &mut data).unwrap();
        JumpResolver::resolve(tree, &mut data).unwrap();
        DeadCodeMarker::mark(tree, &mut data).unwrap();
        data
    }

    #[test]
    fn test_code_after_return_jump_is_dead() {
        let mut asm = ParseTreeBuilder::new();
        let end = asm.label();
        let dead_target = asm.label();
        asm.subroutine();
        asm.jmp(end); // 0
        asm.emit(Instruction::constant(Constant::Int(1))); // 1 dead
        asm.jmp(dead_target); // 2 dead jump
        asm.place(dead_target);
        asm.simple(Opcode::Nop); // 3 dead, its only origin is dead
        asm.place(end);
        asm.simple(Opcode::Retn); // 4
        let tree = asm.finish().unwrap();
        let data = marked(&tree);

        assert_eq!(data.state(CmdId::new(0)).unwrap(), CodeState::Normal);
        assert_eq!(data.state(CmdId::new(1)).unwrap(), CodeState::Dead);
        assert_eq!(data.state(CmdId::new(2)).unwrap(), CodeState::DeadProcess);
        assert_eq!(data.state(CmdId::new(3)).unwrap(), CodeState::Dead);
        assert_eq!(data.state(CmdId::new(4)).unwrap(), CodeState::Normal);
        assert!(data.origins(CmdId::new(3)).unwrap().is_empty());
        assert_eq!(data.dead_origins(CmdId::new(3)), &[CmdId::new(2)]);
    }

    #[test]
    fn test_uncalled_subroutine_is_dead() {
        let mut asm = ParseTreeBuilder::new();
        asm.subroutine();
        asm.simple(Opcode::Retn);
        asm.subroutine();
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = marked(&tree);
        assert!(!data.is_dead(CmdId::new(0)).unwrap());
        assert!(data.is_dead(CmdId::new(1)).unwrap());
    }

    #[test]
    fn test_backward_call_made_live_by_later_pass() {
        // sub0 calls sub2, sub2 calls sub1 which precedes it
        let mut asm = ParseTreeBuilder::new();
        let one = asm.label();
        let two = asm.label();
        asm.subroutine();
        asm.jsr(two);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(one);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(two);
        asm.jsr(one);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = marked(&tree);
        for cmd in tree.commands() {
            assert_eq!(data.state(cmd).unwrap(), CodeState::Normal);
        }
    }

    #[test]
    fn test_short_circuit_and_tagged() {
        let mut asm = ParseTreeBuilder::new();
        let skip = asm.label();
        asm.subroutine();
        asm.emit(Instruction::constant(Constant::Int(1)));
        asm.emit(Instruction::cptopsp(-4, 4));
        asm.jz(skip); // 2
        asm.emit(Instruction::constant(Constant::Int(0)));
        asm.emit(Instruction::simple(Opcode::LogAnd, TypeCode::IntInt));
        asm.place(skip);
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = marked(&tree);
        assert_eq!(data.state(CmdId::new(2)).unwrap(), CodeState::LogOr);
    }

    #[test]
    fn test_closure_body_after_store_state_is_live() {
        let mut asm = ParseTreeBuilder::new();
        let after = asm.label();
        asm.subroutine();
        asm.emit(Instruction::store_state(0, 0));
        asm.jmp(after);
        asm.simple(Opcode::Nop); // closure body
        asm.simple(Opcode::Retn);
        asm.place(after);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();
        let data = marked(&tree);
        assert!(!data.is_dead(CmdId::new(2)).unwrap());
        assert!(!data.is_dead(CmdId::new(3)).unwrap());
    }
}
