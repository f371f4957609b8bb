//! Engine action catalog.
//!
//! `ACTION` instructions call engine functions by numeric id. The decompiler needs their
//! signatures to know how many stack slots a call consumes and produces. The catalog is a
//! collaborator: it is loaded elsewhere and handed in by reference.

use std::collections::HashMap;

use crate::types::Type;

/// Lookup of engine action signatures by id.
///
/// Implementations must be immutable after construction and shareable across threads;
/// reconstruction may run on a worker pool.
pub trait ActionCatalog: Send + Sync {
    /// Name of action `id`, `None` when the id is unknown.
    fn name(&self, id: u16) -> Option<&str>;

    /// Parameter types of action `id` in declaration order.
    fn param_types(&self, id: u16) -> Option<&[Type]>;

    /// Return type of action `id`.
    fn return_type(&self, id: u16) -> Option<&Type>;

    /// Source text of each parameter's default value, `None` for parameters without one.
    fn default_values(&self, id: u16) -> Option<&[Option<String>]>;
}

/// Signature of one engine action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSignature {
    /// Function name
    pub name: String,
    /// Return type
    pub return_type: Type,
    /// Parameter types
    pub params: Vec<Type>,
    /// Default value source text per parameter
    pub defaults: Vec<Option<String>>,
}

impl ActionSignature {
    /// Creates a signature with no default values.
    #[must_use]
    pub fn new(name: impl Into<String>, return_type: Type, params: Vec<Type>) -> Self {
        let defaults = vec![None; params.len()];
        ActionSignature {
            name: name.into(),
            return_type,
            params,
            defaults,
        }
    }

    /// Sets the default values of the trailing parameters.
    ///
    /// `defaults` is aligned to the end of the parameter list.
    #[must_use]
    pub fn with_defaults(mut self, defaults: &[&str]) -> Self {
        let start = self.params.len().saturating_sub(defaults.len());
        for (slot, value) in self.defaults[start..].iter_mut().zip(defaults) {
            *slot = Some((*value).to_string());
        }
        self
    }
}

/// A map-backed [`ActionCatalog`].
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    actions: HashMap<u16, ActionSignature>,
}

impl ActionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `signature` under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: u16, signature: ActionSignature) {
        self.actions.insert(id, signature);
    }

    /// Builder-style [`ActionTable::insert`].
    #[must_use]
    pub fn with(mut self, id: u16, signature: ActionSignature) -> Self {
        self.insert(id, signature);
        self
    }

    /// Full signature of action `id`.
    #[must_use]
    pub fn signature(&self, id: u16) -> Option<&ActionSignature> {
        self.actions.get(&id)
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// `true` when no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl ActionCatalog for ActionTable {
    fn name(&self, id: u16) -> Option<&str> {
        self.actions.get(&id).map(|a| a.name.as_str())
    }

    fn param_types(&self, id: u16) -> Option<&[Type]> {
        self.actions.get(&id).map(|a| a.params.as_slice())
    }

    fn return_type(&self, id: u16) -> Option<&Type> {
        self.actions.get(&id).map(|a| &a.return_type)
    }

    fn default_values(&self, id: u16) -> Option<&[Option<String>]> {
        self.actions.get(&id).map(|a| a.defaults.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_defaults() {
        let table = ActionTable::new().with(
            3,
            ActionSignature::new(
                "FloatToString",
                Type::STRING,
                vec![Type::FLOAT, Type::INT, Type::INT],
            )
            .with_defaults(&["18", "9"]),
        );

        let defaults = table.default_values(3).unwrap();
        assert_eq!(defaults, &[None, Some("18".into()), Some("9".into())]);
        assert_eq!(table.name(3), Some("FloatToString"));
        assert_eq!(table.return_type(3), Some(&Type::STRING));
        assert!(table.param_types(4).is_none());
    }
}
