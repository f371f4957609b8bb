//! Declared stack effect of each instruction.
//!
//! The effect is counted in 4-byte slots. It depends on the instruction's type byte and
//! operands, on the action catalog for `ACTION`, and on the callee's parameter slots for
//! `JSR`; when either of the latter is not known the effect is unknown.

use crate::bytecode::{ActionCatalog, Instruction, Opcode, Operand, TypeCode};

/// Slots popped and pushed by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StackEffect {
    /// Slots removed from the top of stack
    pub pops: u32,
    /// Slots added after the pops
    pub pushes: u32,
}

impl StackEffect {
    /// Creates an effect.
    #[must_use]
    pub const fn new(pops: u32, pushes: u32) -> Self {
        StackEffect { pops, pushes }
    }

    /// Net change of the stack height.
    #[must_use]
    pub fn net(&self) -> i64 {
        i64::from(self.pushes) - i64::from(self.pops)
    }
}

/// Slots consumed by the first `argc` parameters of action `id`, and slots returned.
#[must_use]
pub fn action_slots(catalog: &dyn ActionCatalog, id: u16, argc: u8) -> Option<(u32, u32)> {
    let params = catalog.param_types(id)?;
    let returns = catalog.return_type(id)?.slots();
    let pops = params.iter().take(argc as usize).map(|p| p.slots()).sum();
    Some((pops, returns))
}

/// Slots of each operand of a binary operator, left then right.
#[must_use]
pub fn binary_operand_slots(instruction: &Instruction) -> Option<(u32, u32)> {
    if instruction.ty == TypeCode::StructStruct {
        let size = u32::from(instruction.struct_size()?) / 4;
        return Some((size, size));
    }
    let (left, right) = instruction.ty.operands()?;
    Some((left.slots(), right.slots()))
}

/// Slots pushed by a binary operator.
#[must_use]
pub fn binary_result_slots(instruction: &Instruction) -> u32 {
    match instruction.opcode {
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
            instruction.ty.arithmetic_result().slots()
        }
        _ => 1,
    }
}

/// Declared stack effect of `instruction`.
///
/// # Arguments
///
/// * `instruction` - The instruction
/// * `catalog` - Action signatures, consulted for `ACTION`
/// * `callee_params` - Parameter slots of the callee, consulted for `JSR`
///
/// # Returns
///
/// `None` when the effect depends on an unknown action or an unprototyped callee, or the
/// operands are malformed.
#[must_use]
pub fn stack_effect(
    instruction: &Instruction,
    catalog: &dyn ActionCatalog,
    callee_params: Option<u32>,
) -> Option<StackEffect> {
    let effect = match instruction.opcode {
        Opcode::RsAdd => StackEffect::new(0, instruction.ty.slots()),
        Opcode::Const => StackEffect::new(0, 1),
        Opcode::CpTopSp | Opcode::CpTopBp => {
            let (_, size) = instruction.stack_operand()?;
            StackEffect::new(0, u32::from(size) / 4)
        }
        Opcode::MovSp => {
            let offset = instruction.offset()?;
            StackEffect::new(offset.unsigned_abs() / 4, 0)
        }
        Opcode::Action => {
            let (id, argc) = instruction.action_operand()?;
            let (pops, pushes) = action_slots(catalog, id, argc)?;
            StackEffect::new(pops, pushes)
        }
        Opcode::Jsr => StackEffect::new(callee_params?, 0),
        Opcode::Jz | Opcode::Jnz => StackEffect::new(1, 0),
        Opcode::Destruct => match instruction.operand {
            Operand::Destruct { size, keep, .. } => {
                StackEffect::new(u32::from(size) / 4, u32::from(keep) / 4)
            }
            _ => return None,
        },
        op if op.is_binary() => {
            let (left, right) = binary_operand_slots(instruction)?;
            StackEffect::new(left + right, binary_result_slots(instruction))
        }
        op if op.is_unary() => StackEffect::new(1, 1),
        _ => StackEffect::default(),
    };
    Some(effect)
}
