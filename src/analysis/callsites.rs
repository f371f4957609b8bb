//! Caller-side parameter count estimation.
//!
//! When a subroutine cannot be typed from its own body, the number of slots its callers
//! push before calling it is the next best evidence. [`CallSiteAnalyzer`] runs a
//! flow-insensitive height walk over every live caller. The walk keeps a mark at the last
//! statement boundary (a `MOVSP`, a jump, a return, a void action) and records, at each
//! call, how far the stack grew since that mark or since the return slot reserved for the
//! call by `RSADD`.

use std::collections::HashMap;

use crate::{
    analysis::{stack_effect, CallGraph, NodeAnalysisData},
    bytecode::{ActionCatalog, Opcode, ParseTree, SubId},
    types::SubroutineState,
    Result,
};

/// Estimates parameter slot counts of callees from their call sites.
pub struct CallSiteAnalyzer<'a> {
    tree: &'a ParseTree,
    data: &'a NodeAnalysisData,
    graph: &'a CallGraph,
    catalog: &'a dyn ActionCatalog,
}

impl<'a> CallSiteAnalyzer<'a> {
    /// Creates an analyzer over an analyzed program.
    #[must_use]
    pub fn new(
        tree: &'a ParseTree,
        data: &'a NodeAnalysisData,
        graph: &'a CallGraph,
        catalog: &'a dyn ActionCatalog,
    ) -> Self {
        CallSiteAnalyzer {
            tree,
            data,
            graph,
            catalog,
        }
    }

    /// Estimates the parameter slots of every called subroutine.
    ///
    /// # Arguments
    ///
    /// * `states` - Prototype records indexed by subroutine; prototyped callees are
    ///   applied with their known effect instead of being estimated
    ///
    /// # Returns
    ///
    /// The largest growth observed at any call site, per callee. Callees never seen at a
    /// live call site are absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotVisited`] when the side table is incomplete.
    pub fn estimate(&self, states: &[SubroutineState]) -> Result<HashMap<SubId, u32>> {
        let mut estimates: HashMap<SubId, u32> = HashMap::new();
        for caller in self.tree.subroutines() {
            self.walk(caller, states, &mut estimates)?;
        }
        Ok(estimates)
    }

    /// Estimates the parameter slots of one callee.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotVisited`] when the side table is incomplete.
    pub fn estimate_for(&self, callee: SubId, states: &[SubroutineState]) -> Result<Option<u32>> {
        let mut estimates = HashMap::new();
        for caller in self.graph.callers(callee) {
            self.walk(caller, states, &mut estimates)?;
        }
        Ok(estimates.get(&callee).copied())
    }

    fn walk(
        &self,
        caller: SubId,
        states: &[SubroutineState],
        estimates: &mut HashMap<SubId, u32>,
    ) -> Result<()> {
        let mut height: i64 = 0;
        let mut mark: i64 = 0;
        // Heights at which a return slot was reserved and no call has consumed it yet.
        let mut reserved: Vec<i64> = Vec::new();

        for &cmd in self.tree.children(caller) {
            if self.data.is_dead(cmd)? {
                continue;
            }
            let instruction = self.tree.instruction(cmd);

            if instruction.opcode == Opcode::Jsr {
                let Some(callee) = self.graph.target(cmd) else {
                    continue;
                };
                let slot = reserved.last().copied().filter(|&h| h >= mark);
                let base = slot.map_or(mark, |h| h + 1);
                let known = states.get(callee.index()).filter(|s| s.is_prototyped());
                if known.is_none() {
                    let growth = (height - base).max(0) as u32;
                    let entry = estimates.entry(callee).or_insert(0);
                    *entry = (*entry).max(growth);
                }
                height = match known {
                    Some(state) => height - i64::from(state.param_slot_count()),
                    None => base,
                };
                if slot.is_some() {
                    reserved.pop();
                }
                continue;
            }

            if instruction.opcode == Opcode::RsAdd {
                reserved.push(height);
            }
            match stack_effect(instruction, self.catalog, None) {
                Some(effect) => height += effect.net(),
                None => height = mark,
            }

            let boundary = match instruction.opcode {
                Opcode::MovSp | Opcode::Jmp | Opcode::Jz | Opcode::Jnz | Opcode::Retn => true,
                Opcode::Action => !matches!(
                    instruction
                        .action_operand()
                        .and_then(|(id, _)| self.catalog.return_type(id)),
                    Some(ty) if ty.slots() > 0
                ),
                _ => false,
            };
            if boundary || height < mark {
                mark = height;
                reserved.clear();
            }
        }
        Ok(())
    }
}
