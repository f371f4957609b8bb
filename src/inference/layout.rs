//! Program entry layout.
//!
//! Compiled programs start with a loader: the first subroutine either calls `main`
//! directly (`[RSADD] JSR main; RETN`) or calls a globals initializer that declares the
//! globals, executes `SAVEBP` and then calls `main`. [`ProgramLayout`] identifies the three
//! roles.

use crate::{
    analysis::{CallGraph, NodeAnalysisData},
    bytecode::{CmdId, Opcode, ParseTree, SubId},
    Result,
};

/// Roles of the subroutines at the start of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLayout {
    /// The first subroutine, where execution starts
    pub entry: SubId,
    /// The loader stub when it only forwards to another subroutine
    pub stub: Option<SubId>,
    /// The globals initializer containing `SAVEBP`
    pub globals: Option<SubId>,
    /// The `SAVEBP` instruction of the globals initializer
    pub save_bp: Option<CmdId>,
    /// The script's main subroutine
    pub main: SubId,
}

impl ProgramLayout {
    /// Identifies entry, stub, globals initializer and main subroutine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotVisited`] when the side table is incomplete, or
    /// [`crate::Error::Malformed`] for a program without subroutines.
    pub fn detect(tree: &ParseTree, data: &NodeAnalysisData, graph: &CallGraph) -> Result<Self> {
        let entry = tree
            .subroutines()
            .next()
            .ok_or_else(|| malformed_error!("program has no subroutines"))?;

        let mut save_bp = None;
        for cmd in tree.commands() {
            if tree.kind(cmd) == Opcode::SaveBp && !data.is_dead(cmd)? {
                save_bp = Some(cmd);
                break;
            }
        }
        let globals = save_bp.map(|cmd| tree.parent(cmd));

        let stub = match Self::forwarded_call(tree, data, graph, entry)? {
            Some(target) if Some(entry) != globals => Some((entry, target)),
            _ => None,
        };

        let mut main = stub.map_or(entry, |(_, target)| target);
        if let (Some(globals), Some(save_bp)) = (globals, save_bp) {
            if let Some(target) = Self::call_after(tree, data, graph, globals, save_bp)? {
                main = target;
            }
        }

        Ok(ProgramLayout {
            entry,
            stub: stub.map(|(sub, _)| sub),
            globals,
            save_bp,
            main,
        })
    }

    /// `true` for subroutines that render as ordinary functions.
    #[must_use]
    pub fn is_function(&self, sub: SubId) -> bool {
        Some(sub) != self.stub && Some(sub) != self.globals
    }

    /// Target of the only call in a subroutine consisting of nothing but that call.
    fn forwarded_call(
        tree: &ParseTree,
        data: &NodeAnalysisData,
        graph: &CallGraph,
        sub: SubId,
    ) -> Result<Option<SubId>> {
        let mut target = None;
        for &cmd in tree.children(sub) {
            if data.is_dead(cmd)? {
                continue;
            }
            match tree.kind(cmd) {
                Opcode::Jsr if target.is_none() => target = graph.target(cmd),
                Opcode::RsAdd | Opcode::MovSp | Opcode::Retn | Opcode::Nop => {}
                _ => return Ok(None),
            }
        }
        Ok(target)
    }

    fn call_after(
        tree: &ParseTree,
        data: &NodeAnalysisData,
        graph: &CallGraph,
        sub: SubId,
        after: CmdId,
    ) -> Result<Option<SubId>> {
        let position = tree.position(after);
        for &cmd in tree.children(sub) {
            if tree.position(cmd) > position && tree.kind(cmd) == Opcode::Jsr && !data.is_dead(cmd)? {
                return Ok(graph.target(cmd));
            }
        }
        Ok(None)
    }
}
