//! Intermediate representation produced by the lifter.
//!
//! A lifted method is a [`BlockGraph`] of [`Block`]s, each holding a list of
//! [`Statement`]s whose expressions are [`Expr`] trees over [`Value`] leaves. Registers
//! are replaced by [`VarId`]s into a per-method [`VariableTable`] during promotion.
//!
//! # Key Components
//!
//! - [`Expr`] - Closed union of expression nodes with owned children
//! - [`Value`] - Leaf values: registers, variables, literals, call targets, metadata
//! - [`Block`] / [`BlockGraph`] - Arena of basic blocks with index edges
//! - [`Variable`] / [`VariableTable`] - Synthetic variables and their inferred types

mod block;
mod expr;
mod value;
mod variable;

pub use block::{Block, BlockGraph, BlockId, BlockKind, Statement, StructureState};
pub use expr::{CompareKind, Expr, IfBody, MathOp};
pub use value::{Value, VarId};
pub use variable::{Variable, VariableTable};
