//! Value types.
//!
//! A [`Type`] is either a simple NCS type code or an aggregate. Aggregates are compared
//! structurally, by their member list; the three-float aggregate is always normalized to
//! [`Type::VECTOR`].

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{bytecode::TypeCode, Result};

/// An aggregate type: an ordered list of members occupying contiguous stack slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    members: Vec<Type>,
}

impl StructType {
    /// Member types in slot order.
    #[must_use]
    pub fn members(&self) -> &[Type] {
        &self.members
    }

    /// `true` when every member type is known.
    #[must_use]
    pub fn is_fully_typed(&self) -> bool {
        self.members.iter().all(Type::is_known)
    }

    /// Total slots of all members.
    #[must_use]
    pub fn slots(&self) -> u32 {
        self.members.iter().map(Type::slots).sum()
    }

    /// Index of the member starting `slot` slots into the aggregate, with its width.
    #[must_use]
    pub fn member_at_slot(&self, slot: u32) -> Option<(usize, &Type)> {
        let mut start = 0;
        for (index, member) in self.members.iter().enumerate() {
            if start == slot {
                return Some((index, member));
            }
            start += member.slots();
        }
        None
    }
}

/// A value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A single NCS type code
    Simple(TypeCode),
    /// A user aggregate
    Struct(Arc<StructType>),
}

impl Type {
    /// `void`
    pub const VOID: Type = Type::Simple(TypeCode::Void);
    /// `int`
    pub const INT: Type = Type::Simple(TypeCode::Int);
    /// `float`
    pub const FLOAT: Type = Type::Simple(TypeCode::Float);
    /// `string`
    pub const STRING: Type = Type::Simple(TypeCode::String);
    /// `object`
    pub const OBJECT: Type = Type::Simple(TypeCode::Object);
    /// `effect`
    pub const EFFECT: Type = Type::Simple(TypeCode::Effect);
    /// `event`
    pub const EVENT: Type = Type::Simple(TypeCode::Event);
    /// `location`
    pub const LOCATION: Type = Type::Simple(TypeCode::Location);
    /// `talent`
    pub const TALENT: Type = Type::Simple(TypeCode::Talent);
    /// `vector`
    pub const VECTOR: Type = Type::Simple(TypeCode::Vector);
    /// Deferred action parameter
    pub const ACTION: Type = Type::Simple(TypeCode::Action);
    /// Not determined
    pub const INVALID: Type = Type::Simple(TypeCode::Invalid);

    /// Decodes a single-value type byte.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownType`] for bytes outside the NCS type table.
    pub fn from_byte(byte: u8) -> Result<Type> {
        Ok(Type::Simple(TypeCode::from_byte(byte)?))
    }

    /// Builds an aggregate over `members`, normalizing three floats to [`Type::VECTOR`].
    #[must_use]
    pub fn structure(members: Vec<Type>) -> Type {
        if members.len() == 3 && members.iter().all(|m| *m == Type::FLOAT) {
            return Type::VECTOR;
        }
        Type::Struct(Arc::new(StructType { members }))
    }

    /// Type code of this type; aggregates report [`TypeCode::Struct`].
    #[must_use]
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Simple(code) => *code,
            Type::Struct(_) => TypeCode::Struct,
        }
    }

    /// Number of 4-byte stack slots occupied by a value of this type.
    #[must_use]
    pub fn slots(&self) -> u32 {
        match self {
            Type::Simple(code) => code.slots(),
            Type::Struct(s) => s.slots(),
        }
    }

    /// `false` only for [`Type::INVALID`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        *self != Type::INVALID
    }

    /// `true` for vectors and user aggregates.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Struct(_)) || *self == Type::VECTOR
    }

    /// Member types of an aggregate; a vector has three float members.
    #[must_use]
    pub fn members(&self) -> Option<Vec<Type>> {
        match self {
            Type::Struct(s) => Some(s.members.clone()),
            _ if *self == Type::VECTOR => Some(vec![Type::FLOAT; 3]),
            _ => None,
        }
    }

    /// Per-slot types, flattening aggregates.
    #[must_use]
    pub fn flatten(&self) -> Vec<Type> {
        match self.members() {
            Some(members) => members.iter().flat_map(Type::flatten).collect(),
            None if self.slots() == 1 => vec![self.clone()],
            None => Vec::new(),
        }
    }

    /// `true` when this type and every member are known.
    #[must_use]
    pub fn is_fully_typed(&self) -> bool {
        match self {
            Type::Struct(s) => s.is_fully_typed(),
            other => other.is_known(),
        }
    }
}

impl From<TypeCode> for Type {
    fn from(code: TypeCode) -> Self {
        Type::Simple(code)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Simple(code) => f.write_str(code.name()),
            Type::Struct(s) => {
                f.write_str("struct {")?;
                for (i, member) in s.members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {member}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

/// Registry of aggregate types seen in a program.
///
/// Every reference to an aggregate is registered; an aggregate referenced from two or more
/// sites is given a stable name `structtypeN` in first-seen order and is declared once at
/// the top of the rendered program. Single-use aggregates render inline.
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    references: HashMap<Arc<StructType>, usize>,
    order: Vec<Arc<StructType>>,
    names: HashMap<Arc<StructType>, String>,
}

impl StructTable {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one reference to `ty` (and to any aggregate members it contains).
    pub fn register(&mut self, ty: &Type) {
        let Type::Struct(s) = ty else {
            return;
        };
        for member in &s.members {
            self.register(member);
        }

        let count = self.references.entry(Arc::clone(s)).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.order.push(Arc::clone(s));
        }
        if *count == 2 {
            let name = format!("structtype{}", self.names.len() + 1);
            self.names.insert(Arc::clone(s), name);
        }
    }

    /// Name of `ty`, once it has been referenced at least twice.
    #[must_use]
    pub fn name(&self, ty: &Type) -> Option<&str> {
        match ty {
            Type::Struct(s) => self.names.get(s).map(String::as_str),
            Type::Simple(_) => None,
        }
    }

    /// Number of registered references to `ty`.
    #[must_use]
    pub fn references(&self, ty: &Type) -> usize {
        match ty {
            Type::Struct(s) => self.references.get(s).copied().unwrap_or(0),
            Type::Simple(_) => 0,
        }
    }

    /// Named aggregates in naming order.
    pub fn named(&self) -> impl Iterator<Item = (&str, &StructType)> + '_ {
        let mut named: Vec<_> = self
            .order
            .iter()
            .filter_map(|s| self.names.get(s).map(|n| (n.as_str(), s.as_ref())))
            .collect();
        named.sort_by_key(|(name, _)| {
            name.trim_start_matches("structtype")
                .parse::<usize>()
                .unwrap_or(usize::MAX)
        });
        named.into_iter()
    }

    /// Source-level spelling of `ty`: a named aggregate renders as `struct structtypeN`.
    #[must_use]
    pub fn spell(&self, ty: &Type) -> String {
        match self.name(ty) {
            Some(name) => format!("struct {name}"),
            None => ty.to_string(),
        }
    }
}
