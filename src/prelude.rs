//! # isilift Prelude
//!
//! The most commonly used types from across the crate, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all isilift operations
pub use crate::Error;

/// The result type used throughout isilift
pub use crate::Result;

// ================================================================================================
// Input Model
// ================================================================================================

/// ISIL instructions and operands
pub use crate::isil::{FlowControl, Instruction, InstructionSet, MemoryOperand, Mnemonic, Operand};

/// Program accessor, its in-memory implementation and the definitions it returns
pub use crate::program::{
    KeyFunction, MetadataUsage, MethodDef, MethodId, Program, ProgramImage, TypeDef, TypeId,
    TypeRef,
};

// ================================================================================================
// Lifting
// ================================================================================================

/// Pipeline driver, configuration and results
pub use crate::lifter::{
    LiftCache, LiftOptions, LiftPasses, LiftedMethod, Lifter, MethodBody,
};

/// Diagnostics recorded per lift
pub use crate::lifter::{EventKind, EventLog};

// ================================================================================================
// Output
// ================================================================================================

/// Text sinks and semantic tags
pub use crate::lifter::{Output, TextBuffer, TextKind};
