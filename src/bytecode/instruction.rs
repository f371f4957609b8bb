//! Decoded NCS instructions.
//!
//! An [`Instruction`] is the opcode, the auxiliary [`TypeCode`] and the decoded operand
//! fields. Instructions are produced by the external parser and are never mutated by the
//! analysis; everything the analysis learns is kept in side tables.

use std::fmt;

use crate::bytecode::{Opcode, TypeCode};

/// Byte width of a `JZ`/`JNZ`/`JMP` instruction.
pub const JUMP_SIZE: u32 = 6;

/// Offset of a `JZ` that skips exactly one following unconditional jump.
///
/// This is the shape the compiler emits at the tail of a `do { } while (c);` loop:
/// `JZ +12; JMP top`.
pub const SKIP_ONE: i32 = (JUMP_SIZE * 2) as i32;

/// Size of the NCS file header that precedes the first instruction.
pub const HEADER_SIZE: u32 = 13;

/// A literal operand of `CONST`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `CONSTI`
    Int(i32),
    /// `CONSTF`
    Float(f32),
    /// `CONSTS`
    String(String),
    /// `CONSTO`; 0 is `OBJECT_SELF`, 1 is `OBJECT_INVALID`
    Object(i32),
}

impl Constant {
    /// The type code of this constant.
    #[must_use]
    pub fn type_code(&self) -> TypeCode {
        match self {
            Constant::Int(_) => TypeCode::Int,
            Constant::Float(_) => TypeCode::Float,
            Constant::String(_) => TypeCode::String,
            Constant::Object(_) => TypeCode::Object,
        }
    }
}

/// Decoded operand fields of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand bytes.
    None,
    /// `CONST` literal.
    Const(Constant),
    /// Stack copy: byte `offset` relative to SP or BP (always negative) and `size` in bytes.
    Stack {
        /// Relative byte offset of the first copied byte
        offset: i32,
        /// Number of bytes copied
        size: u16,
    },
    /// Relative byte offset: jump distance, `MOVSP` adjustment or the addressed slot of
    /// `INCISP`/`DECISP`/`INCIBP`/`DECIBP`.
    Offset(i32),
    /// Engine action call.
    Action {
        /// Action id in the catalog
        id: u16,
        /// Number of arguments pushed by the caller
        argc: u8,
    },
    /// `DESTRUCT`: drop `size` bytes but keep `keep` bytes starting at `offset` into them.
    Destruct {
        /// Bytes removed from the top of stack
        size: u16,
        /// Byte offset of the kept element inside the removed region
        offset: u16,
        /// Bytes kept
        keep: u16,
    },
    /// `STORE_STATE`: sizes of the saved global and local frames.
    StoreState {
        /// Saved base-relative bytes
        bp: u32,
        /// Saved stack-relative bytes
        sp: u32,
    },
    /// Operand size of a `StructStruct` comparison.
    Size(u16),
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Instruction opcode
    pub opcode: Opcode,
    /// Auxiliary type byte
    pub ty: TypeCode,
    /// Decoded operand fields
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction from its parts.
    #[must_use]
    pub fn new(opcode: Opcode, ty: TypeCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            ty,
            operand,
        }
    }

    /// An operand-less instruction such as `RETN` or `ADDII`.
    #[must_use]
    pub fn simple(opcode: Opcode, ty: TypeCode) -> Self {
        Self::new(opcode, ty, Operand::None)
    }

    /// `RSADDx`
    #[must_use]
    pub fn rsadd(ty: TypeCode) -> Self {
        Self::simple(Opcode::RsAdd, ty)
    }

    /// `CONSTx`
    #[must_use]
    pub fn constant(value: Constant) -> Self {
        let ty = value.type_code();
        Self::new(Opcode::Const, ty, Operand::Const(value))
    }

    /// `CPTOPSP offset size`
    #[must_use]
    pub fn cptopsp(offset: i32, size: u16) -> Self {
        Self::new(Opcode::CpTopSp, TypeCode::Object, Operand::Stack { offset, size })
    }

    /// `CPDOWNSP offset size`
    #[must_use]
    pub fn cpdownsp(offset: i32, size: u16) -> Self {
        Self::new(Opcode::CpDownSp, TypeCode::Object, Operand::Stack { offset, size })
    }

    /// `CPTOPBP offset size`
    #[must_use]
    pub fn cptopbp(offset: i32, size: u16) -> Self {
        Self::new(Opcode::CpTopBp, TypeCode::Object, Operand::Stack { offset, size })
    }

    /// `CPDOWNBP offset size`
    #[must_use]
    pub fn cpdownbp(offset: i32, size: u16) -> Self {
        Self::new(Opcode::CpDownBp, TypeCode::Object, Operand::Stack { offset, size })
    }

    /// `MOVSP offset`
    #[must_use]
    pub fn movsp(offset: i32) -> Self {
        Self::new(Opcode::MovSp, TypeCode::Void, Operand::Offset(offset))
    }

    /// `ACTION id argc`
    #[must_use]
    pub fn action(id: u16, argc: u8) -> Self {
        Self::new(Opcode::Action, TypeCode::Void, Operand::Action { id, argc })
    }

    /// A jump-shaped instruction (`JMP`, `JSR`, `JZ`, `JNZ`) with a relative offset.
    #[must_use]
    pub fn jump(opcode: Opcode, offset: i32) -> Self {
        Self::new(opcode, TypeCode::Void, Operand::Offset(offset))
    }

    /// `INCISP`/`DECISP`/`INCIBP`/`DECIBP` on the integer at `offset`.
    #[must_use]
    pub fn step(opcode: Opcode, offset: i32) -> Self {
        Self::new(opcode, TypeCode::Int, Operand::Offset(offset))
    }

    /// `DESTRUCT size offset keep`
    #[must_use]
    pub fn destruct(size: u16, offset: u16, keep: u16) -> Self {
        Self::new(
            Opcode::Destruct,
            TypeCode::Void,
            Operand::Destruct { size, offset, keep },
        )
    }

    /// `STORE_STATE bp sp`
    #[must_use]
    pub fn store_state(bp: u32, sp: u32) -> Self {
        Self::new(
            Opcode::StoreState,
            TypeCode::Void,
            Operand::StoreState { bp, sp },
        )
    }

    /// Encoded size of this instruction in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        match (&self.opcode, &self.operand) {
            (_, Operand::Const(Constant::String(s))) => 4 + s.len() as u32,
            (_, Operand::Const(_)) => 6,
            (_, Operand::Stack { .. }) => 8,
            (_, Operand::Offset(_)) => 6,
            (_, Operand::Action { .. }) => 5,
            (_, Operand::Destruct { .. }) => 8,
            (_, Operand::StoreState { .. }) => 10,
            (_, Operand::Size(_)) => 4,
            (_, Operand::None) => 2,
        }
    }

    /// Relative offset of a jump-shaped instruction.
    #[must_use]
    pub fn jump_offset(&self) -> Option<i32> {
        match (self.opcode.is_jump(), &self.operand) {
            (true, Operand::Offset(offset)) => Some(*offset),
            _ => None,
        }
    }

    /// Relative offset operand of `MOVSP` and the step instructions.
    #[must_use]
    pub fn offset(&self) -> Option<i32> {
        match &self.operand {
            Operand::Offset(offset) => Some(*offset),
            _ => None,
        }
    }

    /// `(offset, size)` of a stack copy instruction, in bytes.
    #[must_use]
    pub fn stack_operand(&self) -> Option<(i32, u16)> {
        match &self.operand {
            Operand::Stack { offset, size } => Some((*offset, *size)),
            _ => None,
        }
    }

    /// `(id, argc)` of an `ACTION` call.
    #[must_use]
    pub fn action_operand(&self) -> Option<(u16, u8)> {
        match &self.operand {
            Operand::Action { id, argc } => Some((*id, *argc)),
            _ => None,
        }
    }

    /// Operand size in bytes of a `StructStruct` comparison.
    #[must_use]
    pub fn struct_size(&self) -> Option<u16> {
        match &self.operand {
            Operand::Size(size) => Some(*size),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.opcode {
            Opcode::RsAdd | Opcode::Const => self.ty.name(),
            _ if self.ty.is_compound() => self.ty.name(),
            _ => "",
        };
        write!(f, "{}{}", self.opcode.mnemonic(), suffix)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Const(c) => match c {
                Constant::Int(v) | Constant::Object(v) => write!(f, " {v}"),
                Constant::Float(v) => write!(f, " {v}"),
                Constant::String(s) => write!(f, " {s:?}"),
            },
            Operand::Stack { offset, size } => write!(f, " {offset}, {size}"),
            Operand::Offset(offset) => write!(f, " {offset}"),
            Operand::Action { id, argc } => write!(f, " {id}({argc})"),
            Operand::Destruct { size, offset, keep } => write!(f, " {size}, {offset}, {keep}"),
            Operand::StoreState { bp, sp } => write!(f, " {bp}, {sp}"),
            Operand::Size(size) => write!(f, " {size}"),
        }
    }
}
