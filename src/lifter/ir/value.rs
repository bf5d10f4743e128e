//! Leaf values of the lifted IR.

use std::{fmt, sync::Arc};

use crate::program::{KeyFunction, MetadataUsage, MethodDef};

/// Index of a synthetic variable in a method's [`crate::lifter::ir::VariableTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    /// Returns the table index of this variable.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A leaf of an expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Machine register by canonical name
    Register(String),
    /// Synthetic variable introduced by promotion
    Variable(VarId),
    /// Numeric literal
    Immediate(i64),
    /// Reference to the instruction at an index, rendered as its label
    Label(usize),
    /// Decoded string literal
    LoadString(String),
    /// Call target resolved to a managed method
    ManagedFunction(Arc<MethodDef>),
    /// Call target known only by address
    UnmanagedFunction(u64),
    /// Call target resolved to a runtime helper
    KnownFunction(KeyFunction),
    /// Resolved global metadata usage
    Metadata(MetadataUsage),
}

impl Value {
    /// Returns the immediate value, if this is one.
    #[must_use]
    pub fn as_immediate(&self) -> Option<i64> {
        match self {
            Value::Immediate(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the variable, if this is one.
    #[must_use]
    pub fn as_variable(&self) -> Option<VarId> {
        match self {
            Value::Variable(var) => Some(*var),
            _ => None,
        }
    }

    /// Returns `true` for values whose meaning does not depend on program state.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Value::Immediate(_) | Value::LoadString(_) | Value::Metadata(_) | Value::Label(_)
        )
    }
}
