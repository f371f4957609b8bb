//! NCS opcode and auxiliary type codes.
//!
//! Every NCS instruction starts with an opcode byte followed by an auxiliary type byte.
//! The type byte selects operand types for arithmetic and comparison instructions
//! (`ADDII`, `EQUALFF`, ...) and the constant kind for `CONST`.

use strum::{EnumCount, EnumIter, FromRepr, IntoStaticStr};

use crate::{Error, Result};

/// NCS instruction opcodes.
///
/// The discriminants are the opcode bytes of the NCS instruction set. The names follow the
/// mnemonics used by the original compiler, without the type suffix carried by the
/// auxiliary [`TypeCode`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, FromRepr, IntoStaticStr,
)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    /// Copy the top of stack down into a stack-relative slot
    #[strum(serialize = "CPDOWNSP")]
    CpDownSp = 0x01,
    /// Reserve a typed slot on the stack
    #[strum(serialize = "RSADD")]
    RsAdd = 0x02,
    /// Copy a stack-relative slot to the top of stack
    #[strum(serialize = "CPTOPSP")]
    CpTopSp = 0x03,
    /// Push a constant
    #[strum(serialize = "CONST")]
    Const = 0x04,
    /// Call an engine action
    #[strum(serialize = "ACTION")]
    Action = 0x05,
    /// Logical and
    #[strum(serialize = "LOGAND")]
    LogAnd = 0x06,
    /// Logical or
    #[strum(serialize = "LOGOR")]
    LogOr = 0x07,
    /// Bitwise inclusive or
    #[strum(serialize = "INCOR")]
    IncOr = 0x08,
    /// Bitwise exclusive or
    #[strum(serialize = "EXCOR")]
    ExcOr = 0x09,
    /// Bitwise and
    #[strum(serialize = "BOOLAND")]
    BoolAnd = 0x0A,
    /// Equality comparison
    #[strum(serialize = "EQUAL")]
    Equal = 0x0B,
    /// Inequality comparison
    #[strum(serialize = "NEQUAL")]
    NEqual = 0x0C,
    /// Greater or equal
    #[strum(serialize = "GEQ")]
    Geq = 0x0D,
    /// Greater than
    #[strum(serialize = "GT")]
    Gt = 0x0E,
    /// Less than
    #[strum(serialize = "LT")]
    Lt = 0x0F,
    /// Less or equal
    #[strum(serialize = "LEQ")]
    Leq = 0x10,
    /// Shift left
    #[strum(serialize = "SHLEFT")]
    ShLeft = 0x11,
    /// Arithmetic shift right
    #[strum(serialize = "SHRIGHT")]
    ShRight = 0x12,
    /// Logical shift right
    #[strum(serialize = "USHRIGHT")]
    UShRight = 0x13,
    /// Addition (also string concatenation)
    #[strum(serialize = "ADD")]
    Add = 0x14,
    /// Subtraction
    #[strum(serialize = "SUB")]
    Sub = 0x15,
    /// Multiplication
    #[strum(serialize = "MUL")]
    Mul = 0x16,
    /// Division
    #[strum(serialize = "DIV")]
    Div = 0x17,
    /// Modulo
    #[strum(serialize = "MOD")]
    Mod = 0x18,
    /// Arithmetic negation
    #[strum(serialize = "NEG")]
    Neg = 0x19,
    /// Ones complement
    #[strum(serialize = "COMP")]
    Comp = 0x1A,
    /// Adjust the stack pointer (pop slots)
    #[strum(serialize = "MOVSP")]
    MovSp = 0x1B,
    /// Save the full VM state (legacy form)
    #[strum(serialize = "STORE_STATEALL")]
    StoreStateAll = 0x1C,
    /// Unconditional jump
    #[strum(serialize = "JMP")]
    Jmp = 0x1D,
    /// Jump to subroutine
    #[strum(serialize = "JSR")]
    Jsr = 0x1E,
    /// Jump if top of stack is zero
    #[strum(serialize = "JZ")]
    Jz = 0x1F,
    /// Return from subroutine
    #[strum(serialize = "RETN")]
    Retn = 0x20,
    /// Remove a region of the stack, keeping one element of it
    #[strum(serialize = "DESTRUCT")]
    Destruct = 0x21,
    /// Logical not
    #[strum(serialize = "NOT")]
    Not = 0x22,
    /// Decrement a stack-relative integer
    #[strum(serialize = "DECISP")]
    DecISp = 0x23,
    /// Increment a stack-relative integer
    #[strum(serialize = "INCISP")]
    IncISp = 0x24,
    /// Jump if top of stack is non-zero
    #[strum(serialize = "JNZ")]
    Jnz = 0x25,
    /// Copy the top of stack down into a base-relative (global) slot
    #[strum(serialize = "CPDOWNBP")]
    CpDownBp = 0x26,
    /// Copy a base-relative (global) slot to the top of stack
    #[strum(serialize = "CPTOPBP")]
    CpTopBp = 0x27,
    /// Decrement a base-relative integer
    #[strum(serialize = "DECIBP")]
    DecIBp = 0x28,
    /// Increment a base-relative integer
    #[strum(serialize = "INCIBP")]
    IncIBp = 0x29,
    /// Save the base pointer and make the current stack the global frame
    #[strum(serialize = "SAVEBP")]
    SaveBp = 0x2A,
    /// Restore the base pointer
    #[strum(serialize = "RESTOREBP")]
    RestoreBp = 0x2B,
    /// Save the VM state for a deferred action argument
    #[strum(serialize = "STORE_STATE")]
    StoreState = 0x2C,
    /// No operation
    #[strum(serialize = "NOP")]
    Nop = 0x2D,
}

impl Opcode {
    /// Decodes an opcode byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOpcode`] if `byte` is not an NCS opcode.
    pub fn from_byte(byte: u8) -> Result<Self> {
        Opcode::from_repr(byte).ok_or(Error::UnknownOpcode(byte))
    }

    /// The mnemonic of this opcode.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// `true` for `JMP`, `JSR`, `JZ` and `JNZ`, the instructions whose operand is a relative
    /// byte offset to another instruction.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Jsr | Opcode::Jz | Opcode::Jnz)
    }

    /// `true` for the conditional jumps `JZ` and `JNZ`.
    #[must_use]
    pub fn is_conditional(self) -> bool {
        matches!(self, Opcode::Jz | Opcode::Jnz)
    }

    /// `true` for comparisons producing an integer truth value.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Equal | Opcode::NEqual | Opcode::Geq | Opcode::Gt | Opcode::Lt | Opcode::Leq
        )
    }

    /// `true` for two-operand arithmetic, bitwise and logical operators.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Opcode::LogAnd
                | Opcode::LogOr
                | Opcode::IncOr
                | Opcode::ExcOr
                | Opcode::BoolAnd
                | Opcode::ShLeft
                | Opcode::ShRight
                | Opcode::UShRight
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
        ) || self.is_comparison()
    }

    /// `true` for one-operand operators.
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(self, Opcode::Neg | Opcode::Comp | Opcode::Not)
    }
}

/// NCS auxiliary type codes.
///
/// Single-value codes name the type of one value (`I`, `F`, ...). Compound codes name the
/// operand pair of a binary instruction (`II`, `IF`, `VF`, ...). `Vector`, `Struct` and
/// `Action` never appear in bytecode; they describe aggregate values and deferred
/// action parameters inside the decompiler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, FromRepr, IntoStaticStr,
)]
#[repr(u8)]
pub enum TypeCode {
    /// No value
    #[strum(serialize = "void")]
    Void = 0x00,
    /// 32-bit signed integer
    #[strum(serialize = "int")]
    Int = 0x03,
    /// 32-bit float
    #[strum(serialize = "float")]
    Float = 0x04,
    /// String reference
    #[strum(serialize = "string")]
    String = 0x05,
    /// Object identifier
    #[strum(serialize = "object")]
    Object = 0x06,
    /// Engine effect
    #[strum(serialize = "effect")]
    Effect = 0x10,
    /// Engine event
    #[strum(serialize = "event")]
    Event = 0x11,
    /// Engine location
    #[strum(serialize = "location")]
    Location = 0x12,
    /// Engine talent
    #[strum(serialize = "talent")]
    Talent = 0x13,
    /// int, int
    #[strum(serialize = "II")]
    IntInt = 0x20,
    /// float, float
    #[strum(serialize = "FF")]
    FloatFloat = 0x21,
    /// object, object
    #[strum(serialize = "OO")]
    ObjectObject = 0x22,
    /// string, string
    #[strum(serialize = "SS")]
    StringString = 0x23,
    /// struct, struct (sized by the instruction)
    #[strum(serialize = "TT")]
    StructStruct = 0x24,
    /// int, float
    #[strum(serialize = "IF")]
    IntFloat = 0x25,
    /// float, int
    #[strum(serialize = "FI")]
    FloatInt = 0x26,
    /// effect, effect
    #[strum(serialize = "EffEff")]
    EffectEffect = 0x30,
    /// event, event
    #[strum(serialize = "EvtEvt")]
    EventEvent = 0x31,
    /// location, location
    #[strum(serialize = "LocLoc")]
    LocationLocation = 0x32,
    /// talent, talent
    #[strum(serialize = "TalTal")]
    TalentTalent = 0x33,
    /// vector, vector
    #[strum(serialize = "VV")]
    VectorVector = 0x3A,
    /// vector, float
    #[strum(serialize = "VF")]
    VectorFloat = 0x3B,
    /// float, vector
    #[strum(serialize = "FV")]
    FloatVector = 0x3C,
    /// Deferred action argument
    #[strum(serialize = "action")]
    Action = 0xE0,
    /// Three floats
    #[strum(serialize = "vector")]
    Vector = 0xF0,
    /// Aggregate of stack slots
    #[strum(serialize = "struct")]
    Struct = 0xF1,
    /// Not determined
    #[strum(serialize = "__invalid")]
    Invalid = 0xFF,
}

impl TypeCode {
    /// Decodes an auxiliary type byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownType`] if `byte` is not in the NCS type table.
    pub fn from_byte(byte: u8) -> Result<Self> {
        TypeCode::from_repr(byte).ok_or(Error::UnknownType(byte))
    }

    /// Source-level type name (`int`, `vector`, ...), or the compound mnemonic.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Number of 4-byte stack slots a value of this type occupies.
    ///
    /// Compound, `Void`, `Action` and `Invalid` codes have no slots of their own;
    /// `Struct` is sized by its members and reports zero here.
    #[must_use]
    pub fn slots(self) -> u32 {
        match self {
            TypeCode::Int
            | TypeCode::Float
            | TypeCode::String
            | TypeCode::Object
            | TypeCode::Effect
            | TypeCode::Event
            | TypeCode::Location
            | TypeCode::Talent => 1,
            TypeCode::Vector => 3,
            _ => 0,
        }
    }

    /// `true` for codes naming an operand pair.
    #[must_use]
    pub fn is_compound(self) -> bool {
        (self as u8) >= 0x20 && (self as u8) <= 0x3C
    }

    /// Operand types of a compound code, left then right.
    ///
    /// Returns `None` for single-value codes and for `StructStruct`, whose operands are
    /// sized by the instruction.
    #[must_use]
    pub fn operands(self) -> Option<(TypeCode, TypeCode)> {
        Some(match self {
            TypeCode::IntInt => (TypeCode::Int, TypeCode::Int),
            TypeCode::FloatFloat => (TypeCode::Float, TypeCode::Float),
            TypeCode::ObjectObject => (TypeCode::Object, TypeCode::Object),
            TypeCode::StringString => (TypeCode::String, TypeCode::String),
            TypeCode::IntFloat => (TypeCode::Int, TypeCode::Float),
            TypeCode::FloatInt => (TypeCode::Float, TypeCode::Int),
            TypeCode::EffectEffect => (TypeCode::Effect, TypeCode::Effect),
            TypeCode::EventEvent => (TypeCode::Event, TypeCode::Event),
            TypeCode::LocationLocation => (TypeCode::Location, TypeCode::Location),
            TypeCode::TalentTalent => (TypeCode::Talent, TypeCode::Talent),
            TypeCode::VectorVector => (TypeCode::Vector, TypeCode::Vector),
            TypeCode::VectorFloat => (TypeCode::Vector, TypeCode::Float),
            TypeCode::FloatVector => (TypeCode::Float, TypeCode::Vector),
            _ => return None,
        })
    }

    /// Result type of an arithmetic instruction over this operand pair.
    ///
    /// Mixed int/float arithmetic yields float; vector arithmetic yields vector.
    #[must_use]
    pub fn arithmetic_result(self) -> TypeCode {
        match self {
            TypeCode::IntInt => TypeCode::Int,
            TypeCode::FloatFloat | TypeCode::IntFloat | TypeCode::FloatInt => TypeCode::Float,
            TypeCode::StringString => TypeCode::String,
            TypeCode::VectorVector | TypeCode::VectorFloat | TypeCode::FloatVector => {
                TypeCode::Vector
            }
            other => other,
        }
    }
}
