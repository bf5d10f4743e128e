//! Architecture-independent instruction stream (ISIL).
//!
//! The lifter consumes methods as a linear list of ISIL instructions produced by an
//! external decoder from x86-64 or ARM64 machine code. Each instruction carries its
//! mnemonic, operands and flow-control classification, with jump targets already resolved
//! to instruction indices.
//!
//! # Examples
//!
//! ```rust
//! use isilift::isil::{FlowControl, Instruction, Mnemonic, Operand};
//!
//! let insn = Instruction::new(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]);
//! assert_eq!(insn.flow, FlowControl::Continue);
//! assert_eq!(insn.to_string(), "000 Move eax, 5");
//! ```

mod instruction;

pub use instruction::{
    FlowControl, Instruction, InstructionSet, MemoryOperand, Mnemonic, Operand,
};
