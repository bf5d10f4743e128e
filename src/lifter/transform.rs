//! Instruction transformation.
//!
//! Maps each ISIL instruction of a block to an IR statement. Registers are canonicalized
//! on the way in, memory operands become `Deref` trees, and calls are resolved to managed
//! methods, runtime helpers, raw addresses or pointer calls. A `Compare` immediately
//! followed by a conditional jump in the same block is merged into a single `If`.
//! Instructions without a rule become [`Expr::Unsupported`] placeholders.

use std::sync::Arc;

use crate::{
    isil::{FlowControl, Instruction, InstructionSet, MemoryOperand, Mnemonic, Operand},
    lifter::{
        canonical::{canonical_register, stack_pointer},
        convention::CallingConvention,
        events::{EventKind, EventLog},
        ir::{BlockGraph, BlockId, CompareKind, Expr, IfBody, MathOp, Statement, Value},
    },
    program::{KeyFunction, MethodDef, Program, TypeRef},
    Result,
};

/// Resolved target of a call instruction.
struct CallTarget {
    target: Expr,
    returns: bool,
    return_type: Option<TypeRef>,
    implicit_arguments: Vec<Expr>,
}

/// Lifts instructions of one method into IR statements.
pub struct Transformer<'a> {
    program: &'a dyn Program,
    method: &'a MethodDef,
    isa: InstructionSet,
    convention: &'static CallingConvention,
    events: &'a EventLog,
}

impl<'a> Transformer<'a> {
    /// Creates a transformer for `method` of `program`.
    pub fn new(program: &'a dyn Program, method: &'a MethodDef, events: &'a EventLog) -> Self {
        let isa = program.instruction_set();
        Transformer {
            program,
            method,
            isa,
            convention: CallingConvention::of(isa),
            events,
        }
    }

    /// Fills every block of `graph` with the statements lifted from its instructions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if a block's instruction range lies outside
    /// `instructions`.
    pub fn transform(&self, instructions: &[Instruction], graph: &mut BlockGraph) -> Result<()> {
        for block in graph.blocks_mut() {
            let slice = instructions.get(block.instructions.clone()).ok_or_else(|| {
                crate::Error::GraphError(format!(
                    "{} covers instructions {:?} of {}",
                    block,
                    block.instructions,
                    instructions.len()
                ))
            })?;
            block.statements = self.transform_block(block.id, slice);
        }
        Ok(())
    }

    /// Lifts the instructions of one block.
    #[must_use]
    pub fn transform_block(&self, block: BlockId, instructions: &[Instruction]) -> Vec<Statement> {
        let mut statements = Vec::with_capacity(instructions.len());
        let mut position = 0;

        while let Some(insn) = instructions.get(position) {
            if insn.mnemonic == Mnemonic::Compare {
                if let Some(jump) = instructions
                    .get(position + 1)
                    .filter(|next| next.mnemonic.is_conditional_jump())
                {
                    statements.push(Statement::new(
                        self.conditional_jump(block, insn, jump),
                        Some(jump.index),
                    ));
                    position += 2;
                    continue;
                }
            }

            statements.push(Statement::new(self.transform_instruction(block, insn), Some(insn.index)));
            position += 1;
        }

        statements
    }

    /// Lifts a single instruction without considering its neighbours.
    #[must_use]
    pub fn transform_instruction(&self, block: BlockId, insn: &Instruction) -> Expr {
        let ops = &insn.operands;
        match insn.mnemonic {
            Mnemonic::Move | Mnemonic::SignExtend => match ops.as_slice() {
                [dst, src] => Expr::assign(self.operand(dst), self.operand(src)),
                _ => self.unsupported(block, insn),
            },
            Mnemonic::LoadAddress => match ops.as_slice() {
                [dst, src] => Expr::assign(self.operand(dst), self.address_of(src)),
                _ => self.unsupported(block, insn),
            },
            Mnemonic::Add
            | Mnemonic::Subtract
            | Mnemonic::Multiply
            | Mnemonic::Divide
            | Mnemonic::ShiftLeft
            | Mnemonic::ShiftRight
            | Mnemonic::And
            | Mnemonic::Or
            | Mnemonic::Xor => {
                let Some(op) = MathOp::from_mnemonic(insn.mnemonic) else {
                    return self.unsupported(block, insn);
                };
                match ops.as_slice() {
                    [dst, left, right] => Expr::assign(
                        self.operand(dst),
                        Expr::math(op, self.operand(left), self.operand(right)),
                    ),
                    [dst, src] => Expr::assign(
                        self.operand(dst),
                        Expr::math(op, self.operand(dst), self.operand(src)),
                    ),
                    _ => self.unsupported(block, insn),
                }
            }
            Mnemonic::Not => match ops.as_slice() {
                [dst] => Expr::assign(self.operand(dst), Expr::Not(Box::new(self.operand(dst)))),
                [dst, src] => Expr::assign(self.operand(dst), Expr::Not(Box::new(self.operand(src)))),
                _ => self.unsupported(block, insn),
            },
            Mnemonic::Compare => match ops.as_slice() {
                [left, right] => {
                    log::warn!(
                        "{}: compare at {} has no consuming conditional jump",
                        self.method,
                        insn.index
                    );
                    self.events
                        .record(EventKind::UnresolvedCompare)
                        .block(block)
                        .instruction(insn.index);
                    Expr::Compare {
                        kind: CompareKind::Unresolved,
                        left: Box::new(self.operand(left)),
                        right: Box::new(self.operand(right)),
                    }
                }
                _ => self.unsupported(block, insn),
            },
            Mnemonic::JumpIfEqual
            | Mnemonic::JumpIfNotEqual
            | Mnemonic::JumpIfGreater
            | Mnemonic::JumpIfGreaterOrEqual
            | Mnemonic::JumpIfLess
            | Mnemonic::JumpIfLessOrEqual => match insn.jump_target() {
                Some(target) => {
                    log::warn!(
                        "{}: conditional jump at {} has no preceding compare",
                        self.method,
                        insn.index
                    );
                    self.events
                        .record(EventKind::UnsupportedInstruction)
                        .block(block)
                        .instruction(insn.index)
                        .message(format!("{insn} without compare"));
                    Expr::If {
                        condition: Box::new(Expr::Unsupported(format!(
                            "condition flags of {}",
                            insn.mnemonic
                        ))),
                        body: IfBody::Goto(target),
                    }
                }
                None => self.unsupported(block, insn),
            },
            Mnemonic::Goto => match insn.jump_target() {
                Some(target) if insn.flow != FlowControl::IndexedJump => Expr::Goto(target),
                _ => self.unsupported(block, insn),
            },
            Mnemonic::Return => self.return_statement(ops),
            Mnemonic::Call | Mnemonic::CallNoReturn => self.call(block, insn),
            Mnemonic::ShiftStack => match ops.as_slice() {
                [amount] => {
                    let sp = stack_pointer(self.isa);
                    Expr::assign(
                        Expr::reg(sp),
                        Expr::math(MathOp::Add, Expr::reg(sp), self.operand(amount)),
                    )
                }
                _ => self.unsupported(block, insn),
            },
            Mnemonic::Exchange
            | Mnemonic::Push
            | Mnemonic::Pop
            | Mnemonic::Interrupt
            | Mnemonic::NotImplemented => self.unsupported(block, insn),
        }
    }

    fn conditional_jump(&self, block: BlockId, compare: &Instruction, jump: &Instruction) -> Expr {
        let (Some(kind), Some(target), [left, right]) = (
            CompareKind::from_jump(jump.mnemonic),
            jump.jump_target(),
            compare.operands.as_slice(),
        ) else {
            self.events
                .record(EventKind::UnsupportedInstruction)
                .block(block)
                .instruction(jump.index)
                .message(format!("{compare}; {jump}"));
            return Expr::Unsupported(format!("{compare}; {jump}"));
        };

        Expr::If {
            condition: Box::new(Expr::Compare {
                kind,
                left: Box::new(self.operand(left)),
                right: Box::new(self.operand(right)),
            }),
            body: IfBody::Goto(target),
        }
    }

    fn return_statement(&self, ops: &[Operand]) -> Expr {
        match ops.first() {
            Some(value) => Expr::Return(Some(Box::new(self.operand(value)))),
            None if self.method.returns_value() => Expr::Return(Some(Box::new(Expr::reg(
                self.convention.return_register(&self.method.return_type),
            )))),
            None => Expr::Return(None),
        }
    }

    fn call(&self, block: BlockId, insn: &Instruction) -> Expr {
        let Some((first, explicit)) = insn.operands.split_first() else {
            return self.unsupported(block, insn);
        };

        let resolved = self.call_target(block, insn, first);
        let arguments = if explicit.is_empty() {
            resolved.implicit_arguments
        } else {
            explicit.iter().map(|op| self.operand(op)).collect()
        };
        let returns = resolved.returns && insn.mnemonic != Mnemonic::CallNoReturn;

        let call = Expr::Call {
            target: Box::new(resolved.target),
            arguments,
            returns,
        };

        if !returns {
            return call;
        }

        let register = match &resolved.return_type {
            Some(ty) => self.convention.return_register(ty),
            None => self.convention.integer_return,
        };
        Expr::assign(Expr::reg(register), call)
    }

    fn call_target(&self, block: BlockId, insn: &Instruction, operand: &Operand) -> CallTarget {
        match operand {
            Operand::Method(method) => self.managed_target(method.clone()),
            Operand::KeyFunction(function) => self.key_function_target(*function),
            Operand::Immediate(address) => {
                let address = *address as u64;
                if let Some(method) = self.program.method_at(address) {
                    return self.managed_target(method);
                }
                if let Some(function) = self.program.key_function_at(address) {
                    return self.key_function_target(function);
                }

                self.events
                    .record(EventKind::UnresolvedCall)
                    .block(block)
                    .instruction(insn.index)
                    .message(format!("call to unknown address 0x{address:X}"));
                CallTarget {
                    target: Expr::Value(Value::UnmanagedFunction(address)),
                    returns: true,
                    return_type: None,
                    implicit_arguments: Vec::new(),
                }
            }
            other => CallTarget {
                target: self.operand(other),
                returns: true,
                return_type: None,
                implicit_arguments: Vec::new(),
            },
        }
    }

    fn managed_target(&self, method: Arc<MethodDef>) -> CallTarget {
        let receiver = (!method.is_static).then_some(TypeRef::Object);
        let types = receiver
            .iter()
            .chain(method.parameters.iter().map(|p| &p.param_type));
        let implicit_arguments = self
            .convention
            .assign(types)
            .into_iter()
            .map_while(|register| register.map(Expr::reg))
            .collect();

        CallTarget {
            returns: method.returns_value(),
            return_type: Some(method.return_type.clone()),
            target: Expr::Value(Value::ManagedFunction(method)),
            implicit_arguments,
        }
    }

    fn key_function_target(&self, function: KeyFunction) -> CallTarget {
        let implicit_arguments = self
            .convention
            .integer
            .iter()
            .take(function.argument_count())
            .map(|register| Expr::reg(*register))
            .collect();

        CallTarget {
            target: Expr::Value(Value::KnownFunction(function)),
            returns: function.returns_value() && !function.is_jump_like(),
            return_type: None,
            implicit_arguments,
        }
    }

    /// Lifts an operand read or written by an instruction.
    fn operand(&self, operand: &Operand) -> Expr {
        match operand {
            Operand::Immediate(value) => Expr::imm(*value),
            Operand::Register(name) => Expr::reg(canonical_register(self.isa, name)),
            Operand::Memory(mem) => Expr::deref(self.memory_address(mem)),
            Operand::StackOffset(_) => Expr::deref(self.address_of(operand)),
            Operand::Instruction(index) => Expr::Value(Value::Label(*index)),
            Operand::Method(method) => Expr::Value(Value::ManagedFunction(method.clone())),
            Operand::KeyFunction(function) => Expr::Value(Value::KnownFunction(*function)),
            Operand::VectorElement { register, index } => Expr::VectorAccess {
                vector: Box::new(Expr::reg(canonical_register(self.isa, register))),
                index: *index,
            },
        }
    }

    /// Lifts the address an operand refers to, without dereferencing it.
    fn address_of(&self, operand: &Operand) -> Expr {
        match operand {
            Operand::Memory(mem) => self.memory_address(mem),
            Operand::StackOffset(offset) => Expr::math(
                MathOp::Add,
                Expr::reg(stack_pointer(self.isa)),
                Expr::imm(*offset),
            ),
            other => self.operand(other),
        }
    }

    /// `base + addend + index * scale`, folded left to right with absent parts omitted.
    fn memory_address(&self, mem: &MemoryOperand) -> Expr {
        let base = mem
            .base
            .as_ref()
            .map(|name| Expr::reg(canonical_register(self.isa, name)));
        let addend = (mem.addend != 0).then(|| Expr::imm(mem.addend));
        let index = mem.index.as_ref().map(|name| {
            let index = Expr::reg(canonical_register(self.isa, name));
            if mem.scale == 1 {
                index
            } else {
                Expr::math(MathOp::Mul, index, Expr::imm(mem.scale))
            }
        });

        [base, addend, index]
            .into_iter()
            .flatten()
            .reduce(|left, right| Expr::math(MathOp::Add, left, right))
            .unwrap_or_else(|| Expr::imm(mem.addend))
    }

    fn unsupported(&self, block: BlockId, insn: &Instruction) -> Expr {
        log::debug!("{}: no lifting rule for {}", self.method, insn);
        self.events
            .record(EventKind::UnsupportedInstruction)
            .block(block)
            .instruction(insn.index)
            .message(insn.to_string());
        Expr::Unsupported(format!("{} {}", insn.mnemonic, render_operands(insn)))
    }
}

fn render_operands(insn: &Instruction) -> String {
    insn.operands
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
