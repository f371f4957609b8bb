//! Variables of one subroutine.
//!
//! The reconstructor creates a [`Variable`] for every named slot it sees (locals, parameters,
//! globals, the return slot) and for every intermediate value on its stack (temporaries).
//! Aggregates are variables whose `members` list the per-member variables; a member points
//! back at its aggregate through `parent`. Names are assigned once reconstruction is
//! complete, in creation order.

use std::collections::HashMap;

use crate::{
    bytecode::TypeCode,
    script::AstId,
    types::Type,
};

/// Arena index of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Creates a `VarId` from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        VarId(index)
    }

    /// The raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Declared in the subroutine body
    Local,
    /// Subroutine parameter
    Param,
    /// Program global, addressed through BP
    Global,
    /// The caller's return slot
    Return,
    /// An intermediate value; never declared
    Temp,
}

/// One variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Storage class
    pub kind: VarKind,
    /// Value type
    pub ty: Type,
    /// Source name, assigned by [`VarTable::assign_names`]
    pub name: Option<String>,
    /// Aggregate this variable is a member of
    pub parent: Option<VarId>,
    /// Member variables of an aggregate, in slot order
    pub members: Vec<VarId>,
    /// Expression held by a temporary
    pub value: Option<AstId>,
    /// Declaration statement of a local
    pub decl: Option<AstId>,
    /// A temporary whose value was moved elsewhere; popping it emits nothing
    pub consumed: bool,
}

impl Variable {
    /// A variable of `kind` and `ty` with no name yet.
    #[must_use]
    pub fn new(kind: VarKind, ty: Type) -> Self {
        Variable {
            kind,
            ty,
            name: None,
            parent: None,
            members: Vec::new(),
            value: None,
            decl: None,
            consumed: false,
        }
    }

    /// A temporary holding `value`.
    #[must_use]
    pub fn temp(ty: Type, value: AstId) -> Self {
        Variable {
            value: Some(value),
            ..Variable::new(VarKind::Temp, ty)
        }
    }

    /// `true` for an aggregate with member variables.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        !self.members.is_empty()
    }
}

/// Variables of one subroutine, indexed by [`VarId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarTable {
    vars: Vec<Variable>,
}

impl VarTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    pub fn add(&mut self, var: Variable) -> VarId {
        self.vars.push(var);
        VarId(self.vars.len() - 1)
    }

    /// Variable by id.
    #[must_use]
    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.vars.get(id.0)
    }

    /// Mutable variable by id.
    pub fn get_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.vars.get_mut(id.0)
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// `true` when no variable exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterates `(id, variable)` in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> + '_ {
        self.vars.iter().enumerate().map(|(i, v)| (VarId(i), v))
    }

    /// Storage class of `id`, `Temp` for unknown ids.
    #[must_use]
    pub fn kind(&self, id: VarId) -> VarKind {
        self.get(id).map_or(VarKind::Temp, |v| v.kind)
    }

    /// Outermost aggregate containing `id`, or `id` itself.
    #[must_use]
    pub fn root(&self, id: VarId) -> VarId {
        let mut current = id;
        while let Some(parent) = self.get(current).and_then(|v| v.parent) {
            current = parent;
        }
        current
    }

    /// Creates an aggregate over `members`, which must not belong to another aggregate yet.
    ///
    /// # Returns
    ///
    /// `None` when a member already has a parent.
    pub fn group(&mut self, members: &[VarId]) -> Option<VarId> {
        let free = members
            .iter()
            .all(|m| matches!(self.get(*m), Some(var) if var.parent.is_none()));
        free.then(|| self.aggregate(members))
    }

    /// Creates an aggregate over freshly added `members`, without checking for an existing
    /// parent. The aggregate inherits the storage class of its first member.
    pub fn aggregate(&mut self, members: &[VarId]) -> VarId {
        let types: Vec<Type> = members
            .iter()
            .filter_map(|m| self.get(*m).map(|v| v.ty.clone()))
            .collect();
        let kind = members.first().map_or(VarKind::Local, |m| self.kind(*m));
        let mut aggregate = Variable::new(kind, Type::structure(types));
        aggregate.members = members.to_vec();
        let id = self.add(aggregate);
        for member in members {
            if let Some(var) = self.get_mut(*member) {
                var.parent = Some(id);
            }
        }
        id
    }

    /// Source name of a member of an aggregate of type `parent`.
    #[must_use]
    pub fn member_name(parent: &Type, index: usize) -> String {
        if *parent == Type::VECTOR {
            return ["x", "y", "z"].get(index).map_or_else(
                || format!("field{}", index + 1),
                |axis| (*axis).to_string(),
            );
        }
        format!("field{}", index + 1)
    }

    /// Names every variable that is not a temporary or an aggregate member.
    ///
    /// Names combine a type prefix with a per-class counter: `int1`, `intParam1`,
    /// `intGlobal1`, `vec1`, `struct1`. Parameters are numbered in creation order, which the
    /// reconstructor keeps equal to declaration order; those of unknown type are named
    /// `__unresolved_paramN` with a 0-based position. Globals are numbered separately so
    /// every subroutine agrees on their names.
    pub fn assign_names(&mut self) {
        let mut counters: HashMap<(String, &'static str), usize> = HashMap::new();
        let mut param_index = 0usize;
        for var in &mut self.vars {
            if var.kind == VarKind::Temp || var.kind == VarKind::Return || var.parent.is_some() {
                continue;
            }
            let suffix = match var.kind {
                VarKind::Param => "Param",
                VarKind::Global => "Global",
                _ => "",
            };
            if var.kind == VarKind::Param {
                param_index += 1;
                if !var.ty.is_fully_typed() {
                    var.name = Some(format!("__unresolved_param{}", param_index - 1));
                    continue;
                }
            }
            let prefix = type_prefix(&var.ty);
            let counter = counters.entry((prefix.clone(), suffix)).or_insert(0);
            *counter += 1;
            var.name = Some(format!("{prefix}{suffix}{counter}"));
        }
    }
}

fn type_prefix(ty: &Type) -> String {
    match ty.code() {
        TypeCode::Vector => "vec".to_string(),
        TypeCode::Struct => "struct".to_string(),
        TypeCode::Invalid => "__invalid".to_string(),
        code => code.name().to_string(),
    }
}
