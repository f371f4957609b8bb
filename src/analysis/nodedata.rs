//! Per-instruction analysis side table.
//!
//! [`NodeAnalysisData`] holds everything the analysis learns about an instruction, keyed by
//! its [`CmdId`]: the resolved position, the jump destination, the liveness state, the
//! reverse jump edges ("origins") and the stack height observed by the type walk. The parse
//! tree itself is never mutated.

use std::collections::HashMap;

use crate::{bytecode::CmdId, Error, Result};

/// Liveness classification of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeState {
    /// Reachable, processed normally
    #[default]
    Normal,
    /// Unreachable
    Dead,
    /// Reachable conditional jump that implements a short-circuit `&&`/`||`
    LogOr,
    /// Unreachable jump or call whose outgoing edge was moved to the dead origins table
    DeadProcess,
}

impl CodeState {
    /// `true` for [`CodeState::Dead`] and [`CodeState::DeadProcess`].
    #[must_use]
    pub fn is_dead(self) -> bool {
        matches!(self, CodeState::Dead | CodeState::DeadProcess)
    }
}

/// Stack observation recorded by the type walk before an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackSnapshot {
    /// Stack height in slots relative to the subroutine entry
    pub height: i32,
}

#[derive(Debug, Clone, Default)]
struct NodeInfo {
    position: u32,
    destination: Option<CmdId>,
    state: CodeState,
    origins: Vec<CmdId>,
    stack: Option<StackSnapshot>,
}

/// Side table of analysis facts, indexed by instruction arena index.
///
/// Every accessor fails with [`Error::NodeNotVisited`] for an instruction the position
/// resolver has not visited.
#[derive(Debug, Clone, Default)]
pub struct NodeAnalysisData {
    nodes: Vec<Option<NodeInfo>>,
    dead_origins: HashMap<CmdId, Vec<CmdId>>,
}

impl NodeAnalysisData {
    /// Creates a table for `command_count` instructions, none visited.
    #[must_use]
    pub fn new(command_count: usize) -> Self {
        NodeAnalysisData {
            nodes: vec![None; command_count],
            dead_origins: HashMap::new(),
        }
    }

    /// Number of slots in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn info(&self, cmd: CmdId) -> Result<&NodeInfo> {
        self.nodes
            .get(cmd.index())
            .and_then(Option::as_ref)
            .ok_or(Error::NodeNotVisited(cmd.index()))
    }

    fn info_mut(&mut self, cmd: CmdId) -> Result<&mut NodeInfo> {
        self.nodes
            .get_mut(cmd.index())
            .and_then(Option::as_mut)
            .ok_or(Error::NodeNotVisited(cmd.index()))
    }

    /// Marks `cmd` visited at `position`.
    pub(crate) fn visit(&mut self, cmd: CmdId, position: u32) {
        if let Some(slot) = self.nodes.get_mut(cmd.index()) {
            *slot = Some(NodeInfo {
                position,
                ..NodeInfo::default()
            });
        }
    }

    /// `true` once the position resolver visited `cmd`.
    #[must_use]
    pub fn is_visited(&self, cmd: CmdId) -> bool {
        self.nodes.get(cmd.index()).is_some_and(Option::is_some)
    }

    /// Resolved byte position of `cmd`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] if `cmd` was never positioned.
    pub fn position(&self, cmd: CmdId) -> Result<u32> {
        Ok(self.info(cmd)?.position)
    }

    /// Jump destination of `cmd`, `None` for non-jumps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] if `cmd` was never positioned.
    pub fn destination(&self, cmd: CmdId) -> Result<Option<CmdId>> {
        Ok(self.info(cmd)?.destination)
    }

    pub(crate) fn set_destination(&mut self, cmd: CmdId, destination: CmdId) -> Result<()> {
        self.info_mut(cmd)?.destination = Some(destination);
        Ok(())
    }

    /// Liveness state of `cmd`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] if `cmd` was never positioned.
    pub fn state(&self, cmd: CmdId) -> Result<CodeState> {
        Ok(self.info(cmd)?.state)
    }

    pub(crate) fn set_state(&mut self, cmd: CmdId, state: CodeState) -> Result<()> {
        self.info_mut(cmd)?.state = state;
        Ok(())
    }

    /// `true` when `cmd` is unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] if `cmd` was never positioned.
    pub fn is_dead(&self, cmd: CmdId) -> Result<bool> {
        Ok(self.state(cmd)?.is_dead())
    }

    /// Live jumps and calls targeting `cmd`, in resolution order.
    ///
    /// Conditional branches, `JMP` and `JSR` all appear here; callers filter by opcode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] if `cmd` was never positioned.
    pub fn origins(&self, cmd: CmdId) -> Result<&[CmdId]> {
        Ok(&self.info(cmd)?.origins)
    }

    pub(crate) fn add_origin(&mut self, destination: CmdId, origin: CmdId) -> Result<()> {
        let origins = &mut self.info_mut(destination)?.origins;
        if !origins.contains(&origin) {
            origins.push(origin);
        }
        Ok(())
    }

    /// Unreachable jumps and calls that targeted `cmd`.
    #[must_use]
    pub fn dead_origins(&self, cmd: CmdId) -> &[CmdId] {
        self.dead_origins.get(&cmd).map_or(&[], Vec::as_slice)
    }

    /// Moves the edge `origin -> destination` from the origins to the dead origins table.
    pub(crate) fn kill_origin(&mut self, destination: CmdId, origin: CmdId) -> Result<()> {
        let origins = &mut self.info_mut(destination)?.origins;
        if let Some(index) = origins.iter().position(|&o| o == origin) {
            origins.remove(index);
            self.dead_origins.entry(destination).or_default().push(origin);
        }
        Ok(())
    }

    /// Stack height observed by the type walk before `cmd`.
    #[must_use]
    pub fn stack(&self, cmd: CmdId) -> Option<StackSnapshot> {
        self.nodes.get(cmd.index())?.as_ref()?.stack
    }

    pub(crate) fn set_stack(&mut self, cmd: CmdId, snapshot: StackSnapshot) -> Result<()> {
        self.info_mut(cmd)?.stack = Some(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unvisited_lookup_fails() {
        let data = NodeAnalysisData::new(2);
        assert_eq!(data.position(CmdId::new(1)), Err(Error::NodeNotVisited(1)));
        assert_eq!(data.position(CmdId::new(9)), Err(Error::NodeNotVisited(9)));
        assert!(data.stack(CmdId::new(0)).is_none());
    }

    #[test]
    fn test_origin_bookkeeping() {
        let mut data = NodeAnalysisData::new(3);
        for i in 0..3 {
            data.visit(CmdId::new(i), 13 + 6 * i as u32);
        }
        let dest = CmdId::new(2);
        data.add_origin(dest, CmdId::new(0)).unwrap();
        data.add_origin(dest, CmdId::new(1)).unwrap();
        data.add_origin(dest, CmdId::new(1)).unwrap();
        assert_eq!(data.origins(dest).unwrap(), &[CmdId::new(0), CmdId::new(1)]);

        data.kill_origin(dest, CmdId::new(0)).unwrap();
        assert_eq!(data.origins(dest).unwrap(), &[CmdId::new(1)]);
        assert_eq!(data.dead_origins(dest), &[CmdId::new(0)]);
        assert_eq!(data.position(dest).unwrap(), 25);
    }
}
