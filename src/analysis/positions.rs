//! Position resolution.

use crate::{analysis::NodeAnalysisData, bytecode::ParseTree, Result};

/// Copies the byte position of every instruction into the side table.
///
/// Positions must be strictly increasing across the whole tree, since the jump resolver
/// searches them by bisection.
pub struct PositionResolver;

impl PositionResolver {
    /// Visits every instruction of `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when positions are not strictly increasing.
    pub fn resolve(tree: &ParseTree, data: &mut NodeAnalysisData) -> Result<()> {
        let mut previous: Option<u32> = None;
        for sub in tree.subroutines() {
            for &cmd in tree.children(sub) {
                let position = tree.position(cmd);
                if previous.is_some_and(|p| p >= position) {
                    return Err(malformed_error!(
                        "instruction {} at position {} does not follow position {}",
                        cmd.index(),
                        position,
                        previous.unwrap_or_default()
                    ));
                }
                data.visit(cmd, position);
                previous = Some(position);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CmdId, Instruction, Opcode, TypeCode};

    #[test]
    fn test_positions_copied() {
        let tree = ParseTree::from_subroutines(vec![vec![
            (13, Instruction::rsadd(TypeCode::Int)),
            (15, Instruction::simple(Opcode::Retn, TypeCode::Void)),
        ]])
        .unwrap();
        let mut data = NodeAnalysisData::new(tree.command_count());
        PositionResolver::resolve(&tree, &mut data).unwrap();
        assert_eq!(data.position(CmdId::new(1)).unwrap(), 15);
    }

    #[test]
    fn test_non_increasing_positions_rejected() {
        let tree = ParseTree::from_subroutines(vec![
            vec![(20, Instruction::simple(Opcode::Retn, TypeCode::Void))],
            vec![(20, Instruction::simple(Opcode::Retn, TypeCode::Void))],
        ])
        .unwrap();
        let mut data = NodeAnalysisData::new(tree.command_count());
        assert!(matches!(
            PositionResolver::resolve(&tree, &mut data),
            Err(crate::Error::Malformed { .. })
        ));
    }
}
