//! Synthetic variables introduced by register promotion.

use crate::{lifter::ir::VarId, program::TypeRef};

/// A synthetic variable standing for one definition of a machine register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Display name; empty until the naming phase runs unless bound to a parameter
    pub name: String,
    /// Inferred type, refined by data-flow analysis and never reset once known
    pub ty: Option<TypeRef>,
    /// `true` for `this`, rendered as a keyword
    pub is_keyword: bool,
    /// Canonical register the variable was promoted from
    pub register: String,
    /// Declared parameter position (`this` excluded) when bound to a parameter
    pub parameter: Option<usize>,
}

/// All variables of one lifted method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    variables: Vec<Variable>,
}

impl VariableTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        VariableTable {
            variables: Vec::new(),
        }
    }

    /// Creates an unnamed, untyped variable for `register`.
    pub fn create(&mut self, register: &str) -> VarId {
        self.insert(Variable {
            name: String::new(),
            ty: None,
            is_keyword: false,
            register: register.to_string(),
            parameter: None,
        })
    }

    /// Adds a fully described variable.
    pub fn insert(&mut self, variable: Variable) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(variable);
        id
    }

    /// Returns a variable.
    #[must_use]
    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// Returns a variable for mutation.
    pub fn get_mut(&mut self, id: VarId) -> Option<&mut Variable> {
        self.variables.get_mut(id.index())
    }

    /// Returns the inferred type of a variable.
    #[must_use]
    pub fn type_of(&self, id: VarId) -> Option<&TypeRef> {
        self.get(id).and_then(|v| v.ty.as_ref())
    }

    /// Sets the type of a variable that has none yet.
    ///
    /// Returns `true` if the type was recorded. Known types are never replaced, which
    /// keeps data-flow refinement monotonic.
    pub fn refine_type(&mut self, id: VarId, ty: TypeRef) -> bool {
        match self.get_mut(id) {
            Some(variable) if variable.ty.is_none() => {
                variable.ty = Some(ty);
                true
            }
            _ => false,
        }
    }

    /// Returns the display name of a variable.
    #[must_use]
    pub fn name(&self, id: VarId) -> &str {
        self.get(id).map_or("?", |v| v.name.as_str())
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if no variables exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterates variables with their ids in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId(i as u32), v))
    }

    /// Iterates variables for mutation in creation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.variables.iter_mut()
    }

    /// Returns the variable with the given display name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<VarId> {
        self.iter().find(|(_, v)| v.name == name).map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refine_type_is_monotonic() {
        let mut table = VariableTable::new();
        let v = table.create("rax");

        assert!(table.type_of(v).is_none());
        assert!(table.refine_type(v, TypeRef::I4));
        assert!(!table.refine_type(v, TypeRef::String));
        assert_eq!(table.type_of(v), Some(&TypeRef::I4));
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let mut table = VariableTable::new();
        let a = table.create("rax");
        let b = table.create("rcx");
        table.get_mut(b).unwrap().name = "var_rcx".into();

        assert_eq!(a, VarId(0));
        assert_eq!(b, VarId(1));
        assert_eq!(table.find("var_rcx"), Some(b));
        assert_eq!(table.name(VarId(7)), "?");
    }
}
