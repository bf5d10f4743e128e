//! ISIL instruction representation, operand types, and flow-control classification.
//!
//! An [`Instruction`] is one architecture-independent operation produced by an external
//! decoder. Jump targets are already resolved into instruction indices, and call targets
//! are resolved as far as the decoder could: to a managed method, a runtime key function,
//! a raw address, or a register holding a pointer.

use std::{fmt, sync::Arc};

use strum::{Display, EnumIter, IntoStaticStr};

use crate::program::{KeyFunction, MethodDef};

/// Instruction-set family of the compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum InstructionSet {
    /// AMD64 / Intel 64
    #[strum(serialize = "x86-64")]
    X86_64,
    /// AArch64
    #[strum(serialize = "arm64")]
    Arm64,
}

/// Control flow behavior of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControl {
    /// Execution continues with the next instruction
    Continue,
    /// Always transfers control to the jump target
    UnconditionalJump,
    /// Transfers control to the jump target or falls through
    ConditionalJump,
    /// Jump through a table; targets are not statically known
    IndexedJump,
    /// Calls a function and resumes at the next instruction
    MethodCall,
    /// Returns from the method
    MethodReturn,
    /// Traps; execution does not continue
    Interrupt,
}

/// ISIL operation mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum Mnemonic {
    /// `dst = src`
    Move,
    /// `dst = &src`
    LoadAddress,
    /// Call that returns to the next instruction
    Call,
    /// Call that never returns
    CallNoReturn,
    /// Swap two operands
    Exchange,
    /// Addition
    Add,
    /// Subtraction
    Subtract,
    /// Multiplication
    Multiply,
    /// Division
    Divide,
    /// Left shift
    ShiftLeft,
    /// Right shift
    ShiftRight,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Bitwise complement
    Not,
    /// Compare two operands, consumed by the next conditional jump
    Compare,
    /// Push onto the machine stack
    Push,
    /// Pop from the machine stack
    Pop,
    /// Return, optionally with a value
    Return,
    /// Unconditional jump
    Goto,
    /// Jump if the last comparison was equal
    JumpIfEqual,
    /// Jump if the last comparison was not equal
    JumpIfNotEqual,
    /// Jump if the last comparison was greater
    JumpIfGreater,
    /// Jump if the last comparison was greater or equal
    JumpIfGreaterOrEqual,
    /// Jump if the last comparison was less
    JumpIfLess,
    /// Jump if the last comparison was less or equal
    JumpIfLessOrEqual,
    /// Software interrupt / trap
    Interrupt,
    /// Adjust the stack pointer by an immediate
    ShiftStack,
    /// Sign-extending move
    SignExtend,
    /// Placeholder for a machine instruction the decoder could not translate
    NotImplemented,
}

impl Mnemonic {
    /// Returns the flow-control classification implied by the mnemonic.
    #[must_use]
    pub fn flow_control(&self) -> FlowControl {
        match self {
            Mnemonic::Call | Mnemonic::CallNoReturn => FlowControl::MethodCall,
            Mnemonic::Return => FlowControl::MethodReturn,
            Mnemonic::Goto => FlowControl::UnconditionalJump,
            Mnemonic::JumpIfEqual
            | Mnemonic::JumpIfNotEqual
            | Mnemonic::JumpIfGreater
            | Mnemonic::JumpIfGreaterOrEqual
            | Mnemonic::JumpIfLess
            | Mnemonic::JumpIfLessOrEqual => FlowControl::ConditionalJump,
            Mnemonic::Interrupt => FlowControl::Interrupt,
            _ => FlowControl::Continue,
        }
    }

    /// Returns `true` for the conditional jump family.
    #[must_use]
    pub fn is_conditional_jump(&self) -> bool {
        self.flow_control() == FlowControl::ConditionalJump
    }
}

/// A memory operand `[base + addend + index * scale]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryOperand {
    /// Base register
    pub base: Option<String>,
    /// Constant displacement, zero when absent
    pub addend: i64,
    /// Index register
    pub index: Option<String>,
    /// Scale applied to the index, meaningful only with an index register
    pub scale: i64,
}

impl MemoryOperand {
    /// `[base + addend]`
    pub fn base_addend(base: impl Into<String>, addend: i64) -> Self {
        MemoryOperand {
            base: Some(base.into()),
            addend,
            index: None,
            scale: 1,
        }
    }

    /// `[address]` with no registers
    #[must_use]
    pub fn absolute(address: i64) -> Self {
        MemoryOperand {
            base: None,
            addend: address,
            index: None,
            scale: 1,
        }
    }

    /// Adds `index * scale` to the operand.
    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>, scale: i64) -> Self {
        self.index = Some(index.into());
        self.scale = scale;
        self
    }
}

/// A decoded ISIL operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Numeric literal, also used for raw addresses
    Immediate(i64),
    /// Machine register by name, not yet canonicalized
    Register(String),
    /// Memory access
    Memory(MemoryOperand),
    /// Stack slot relative to the stack pointer
    StackOffset(i64),
    /// Jump target, as an index into the instruction stream
    Instruction(usize),
    /// Resolved managed call target
    Method(Arc<MethodDef>),
    /// Resolved runtime helper call target
    KeyFunction(KeyFunction),
    /// Lane of a vector register
    VectorElement {
        /// Vector register name
        register: String,
        /// Lane index
        index: u32,
    },
}

impl Operand {
    /// Shorthand for [`Operand::Register`].
    pub fn reg(name: impl Into<String>) -> Self {
        Operand::Register(name.into())
    }

    /// Shorthand for [`Operand::Immediate`].
    #[must_use]
    pub fn imm(value: i64) -> Self {
        Operand::Immediate(value)
    }

    /// Shorthand for a `[base + addend]` memory operand.
    pub fn mem(base: impl Into<String>, addend: i64) -> Self {
        Operand::Memory(MemoryOperand::base_addend(base, addend))
    }

    /// Shorthand for [`Operand::Instruction`].
    #[must_use]
    pub fn target(index: usize) -> Self {
        Operand::Instruction(index)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Immediate(value) if *value > 0xFFFF => write!(f, "0x{value:X}"),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::Register(name) => f.write_str(name),
            Operand::Memory(mem) => {
                f.write_str("[")?;
                let mut first = true;
                if let Some(base) = &mem.base {
                    f.write_str(base)?;
                    first = false;
                }
                if let Some(index) = &mem.index {
                    if !first {
                        f.write_str("+")?;
                    }
                    write!(f, "{index}*{}", mem.scale)?;
                    first = false;
                }
                if mem.addend != 0 || first {
                    if !first {
                        f.write_str("+")?;
                    }
                    write!(f, "0x{:X}", mem.addend)?;
                }
                f.write_str("]")
            }
            Operand::StackOffset(offset) => write!(f, "stack:0x{offset:X}"),
            Operand::Instruction(index) => write!(f, "{{{index}}}"),
            Operand::Method(method) => write!(f, "{method}"),
            Operand::KeyFunction(function) => write!(f, "{function}"),
            Operand::VectorElement { register, index } => write!(f, "{register}[{index}]"),
        }
    }
}

/// A single ISIL instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// Position of the instruction in its method's stream
    pub index: usize,
    /// Operation
    pub mnemonic: Mnemonic,
    /// Ordered operands
    pub operands: Vec<Operand>,
    /// Flow-control classification
    pub flow: FlowControl,
}

impl Instruction {
    /// Creates an instruction whose flow control is implied by the mnemonic.
    #[must_use]
    pub fn new(index: usize, mnemonic: Mnemonic, operands: Vec<Operand>) -> Self {
        Instruction {
            index,
            mnemonic,
            operands,
            flow: mnemonic.flow_control(),
        }
    }

    /// Overrides the flow-control classification.
    #[must_use]
    pub fn with_flow(mut self, flow: FlowControl) -> Self {
        self.flow = flow;
        self
    }

    /// Returns the jump target of a branch instruction.
    #[must_use]
    pub fn jump_target(&self) -> Option<usize> {
        self.operands.iter().find_map(|op| match op {
            Operand::Instruction(index) => Some(*index),
            _ => None,
        })
    }

    /// Returns `true` when no instruction after this one in the same block may follow.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        self.mnemonic == Mnemonic::CallNoReturn
            || !matches!(self.flow, FlowControl::Continue | FlowControl::MethodCall)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} {}", self.index, self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}
