//! The lifting entry point.
//!
//! [`Lifter`] drives one method through the whole pipeline:
//!
//! 1. CFG construction ([`CfgBuilder`])
//! 2. Instruction transformation ([`Transformer`])
//! 3. Variable promotion
//! 4. Data-flow, metadata, string and folding passes to a shared fixed point
//! 5. Expression inlining, followed by folding, once or to a fixed point
//! 6. Branch structuring and label counting
//!
//! Failures never escape [`Lifter::lift`]: a method whose lift fails becomes a single
//! block holding the error text as a comment, so one malformed method cannot abort a
//! batch.

use std::{ops::Range, sync::Arc};

use rayon::prelude::*;

use crate::{
    isil::Instruction,
    lifter::{
        cfg::CfgBuilder,
        emit::{Output, TextBuffer},
        events::{EventKind, EventLog},
        ir::{Block, BlockGraph, BlockKind, Expr, Statement, VariableTable},
        options::LiftOptions,
        passes::{
            BranchStructuring, ConstantFolder, DataFlow, ExpressionInliner, LabelCounter,
            LiftContext, LiftPass, MetadataInliner, PassScheduler, StringInliner,
            VariablePromotion,
        },
        transform::Transformer,
    },
    program::{MethodDef, MethodId, Program},
    Error, Result,
};

/// A method and its instruction stream, as handed to batch lifting.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// The method
    pub method: Arc<MethodDef>,
    /// Its ISIL instructions in order
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Pairs a method with its instructions.
    #[must_use]
    pub fn new(method: Arc<MethodDef>, instructions: Vec<Instruction>) -> Self {
        MethodBody {
            method,
            instructions,
        }
    }
}

/// The result of lifting one method.
#[derive(Debug, Clone)]
pub struct LiftedMethod {
    /// Identity of the lifted method
    pub method: MethodId,
    /// Display name of the lifted method
    pub name: String,
    /// All blocks, including absorbed ones that emission skips
    pub blocks: Vec<Block>,
    /// Variables referenced by the blocks
    pub variables: VariableTable,
    /// What the pipeline did and where it degraded
    pub events: EventLog,
}

impl LiftedMethod {
    /// Returns the blocks that are written at the top level, in address order.
    pub fn visible_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| !b.ignore)
    }

    /// Returns `true` if the lift failed and the blocks only hold the fault.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.events.has(EventKind::Fault)
    }

    /// Returns the contained failure as an [`Error::LiftFault`], if the lift failed.
    #[must_use]
    pub fn fault(&self) -> Option<Error> {
        self.events
            .filter_kind(EventKind::Fault)
            .next()
            .map(|event| Error::LiftFault {
                method: self.name.clone(),
                message: event.message.clone(),
            })
    }

    /// Writes every visible block to `out`, one indentation level deep so labels can
    /// be dedented.
    pub fn write(&self, out: &mut dyn Output) {
        out.increase_indent();
        for block in self.visible_blocks() {
            block.write(out, &self.variables);
        }
        out.decrease_indent();
    }

    /// Renders the method to plain text.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut buffer = TextBuffer::new();
        self.write(&mut buffer);
        buffer.into_text()
    }
}

/// Lifts methods of one program.
///
/// A `Lifter` holds no per-method state and can be shared between threads; every lift
/// owns its own block graph.
///
/// # Examples
///
/// ```rust
/// use isilift::{
///     isil::{Instruction, InstructionSet, Mnemonic, Operand},
///     program::{MethodDef, MethodId, ProgramImage, TypeRef},
///     Lifter,
/// };
///
/// let image = ProgramImage::builder(InstructionSet::X86_64).build();
/// let method = MethodDef::new(MethodId(1), "Answer", "Demo").returning(TypeRef::I4);
/// let code = vec![
///     Instruction::new(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]),
///     Instruction::new(1, Mnemonic::Add, vec![Operand::reg("eax"), Operand::reg("eax"), Operand::imm(3)]),
///     Instruction::new(2, Mnemonic::Return, vec![Operand::reg("eax")]),
/// ];
///
/// let lifted = Lifter::new(&image).lift(&method, &code);
/// assert_eq!(lifted.to_text(), "    var_rax_1 = 8;\n    return var_rax_1;\n");
/// ```
pub struct Lifter<'p> {
    program: &'p dyn Program,
    options: LiftOptions,
}

impl<'p> Lifter<'p> {
    /// Creates a lifter with the default options.
    #[must_use]
    pub fn new(program: &'p dyn Program) -> Self {
        Self::with_options(program, LiftOptions::default())
    }

    /// Creates a lifter with explicit options.
    #[must_use]
    pub fn with_options(program: &'p dyn Program, options: LiftOptions) -> Self {
        Lifter { program, options }
    }

    /// Returns the active options.
    #[must_use]
    pub fn options(&self) -> &LiftOptions {
        &self.options
    }

    /// Lifts one method, containing any failure in a fault block.
    #[must_use]
    pub fn lift(&self, method: &MethodDef, instructions: &[Instruction]) -> LiftedMethod {
        self.try_lift(method, instructions)
            .unwrap_or_else(|error| self.fault(method, &error.to_string()))
    }

    /// Lifts one method, returning the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for an empty instruction list and
    /// [`crate::Error::Malformed`] or [`crate::Error::GraphError`] for control flow that
    /// cannot be represented.
    pub fn try_lift(&self, method: &MethodDef, instructions: &[Instruction]) -> Result<LiftedMethod> {
        let graph = CfgBuilder::new(instructions).build()?;
        self.run(method, instructions, graph)
    }

    /// Lifts one method whose basic blocks were already delimited by the caller.
    ///
    /// `partition` holds contiguous position ranges into `instructions`; only the edges
    /// are computed here. Failures are contained as in [`Lifter::lift`].
    #[must_use]
    pub fn lift_partitioned(
        &self,
        method: &MethodDef,
        instructions: &[Instruction],
        partition: &[Range<usize>],
    ) -> LiftedMethod {
        CfgBuilder::new(instructions)
            .build_from_partition(partition)
            .and_then(|graph| self.run(method, instructions, graph))
            .unwrap_or_else(|error| self.fault(method, &error.to_string()))
    }

    /// Lifts many methods in parallel.
    ///
    /// Results are in input order. Each method is lifted in isolation; a fault in one
    /// only affects its own result.
    #[must_use]
    pub fn lift_all(&self, bodies: &[MethodBody]) -> Vec<LiftedMethod> {
        bodies
            .par_iter()
            .map(|body| self.lift(&body.method, &body.instructions))
            .collect()
    }

    fn run(
        &self,
        method: &MethodDef,
        instructions: &[Instruction],
        mut graph: BlockGraph,
    ) -> Result<LiftedMethod> {
        let events = EventLog::new();
        Transformer::new(self.program, method, &events).transform(instructions, &mut graph)?;

        let mut ctx = LiftContext::new(method, self.program, &self.options, graph, events);
        VariablePromotion::new().run(&mut ctx)?;

        let rounds = PassScheduler::new(self.options.max_fixpoint_iterations)
            .with(DataFlow::new())
            .with(MetadataInliner::new())
            .with(StringInliner::new())
            .with(ConstantFolder::new())
            .run_to_fixpoint(&mut ctx)?;
        log::debug!("{method}: analysis settled after {rounds} changing rounds");

        let inlining = PassScheduler::new(self.options.max_inline_rounds)
            .with(ExpressionInliner::new())
            .with(ConstantFolder::new());
        if self.options.inline_to_fixpoint {
            inlining.run_to_fixpoint(&mut ctx)?;
        } else {
            inlining.run_once(&mut ctx)?;
        }

        PassScheduler::new(1)
            .with(BranchStructuring::new())
            .with(LabelCounter::new())
            .run_once(&mut ctx)?;

        log::debug!("{method}: {}", ctx.events.summary());
        Ok(LiftedMethod {
            method: method.id,
            name: method.to_string(),
            blocks: ctx.graph.into_blocks(),
            variables: ctx.variables,
            events: ctx.events,
        })
    }

    fn fault(&self, method: &MethodDef, message: &str) -> LiftedMethod {
        log::warn!("{method}: lifting failed: {message}");

        let events = EventLog::new();
        events.record(EventKind::Fault).message(message);

        let mut block = Block::new(0, BlockKind::Interrupt, 0, 0..0);
        block.statements.push(Statement::new(
            Expr::Comment(format!("lifting failed: {message}")),
            None,
        ));

        LiftedMethod {
            method: method.id,
            name: method.to_string(),
            blocks: vec![block],
            variables: VariableTable::new(),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        isil::{InstructionSet, Mnemonic, Operand},
        program::{ProgramImage, TypeRef},
        test::insn,
    };

    fn scenario_a() -> Vec<Instruction> {
        vec![
            insn(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]),
            insn(1, Mnemonic::Add, vec![Operand::reg("eax"), Operand::reg("eax"), Operand::imm(3)]),
            insn(2, Mnemonic::Return, vec![Operand::reg("eax")]),
        ]
    }

    fn method() -> MethodDef {
        MethodDef::new(MethodId(7), "Answer", "Demo").returning(TypeRef::I4)
    }

    #[test]
    fn test_presets_change_output() {
        let image = ProgramImage::builder(InstructionSet::X86_64).build();
        let code = scenario_a();

        let default = Lifter::new(&image).lift(&method(), &code);
        assert_eq!(default.to_text(), "    var_rax_1 = 8;\n    return var_rax_1;\n");

        let full = Lifter::with_options(&image, LiftOptions::full()).lift(&method(), &code);
        assert_eq!(full.to_text(), "    return 8;\n");

        let minimal = Lifter::with_options(&image, LiftOptions::minimal()).lift(&method(), &code);
        assert_eq!(
            minimal.to_text(),
            "    var_rax = 5;\n    var_rax_1 = var_rax + 3;\n    return var_rax_1;\n"
        );
    }

    #[test]
    fn test_fault_is_contained() {
        let image = ProgramImage::builder(InstructionSet::X86_64).build();
        let code = vec![insn(0, Mnemonic::Goto, vec![Operand::target(9)])];

        let lifted = Lifter::new(&image).lift(&method(), &code);
        assert!(lifted.is_fault());
        assert!(matches!(lifted.fault(), Some(Error::LiftFault { .. })));
        assert_eq!(lifted.blocks.len(), 1);
        assert!(lifted.to_text().starts_with("    /* lifting failed: Malformed"));
        assert!(Lifter::new(&image).try_lift(&method(), &code).is_err());

        let empty = Lifter::new(&image).lift(&method(), &[]);
        assert!(empty.is_fault());

        let fine = Lifter::new(&image).lift(&method(), &scenario_a());
        assert_eq!(fine.fault(), None);
    }

    #[test]
    fn test_partitioned_lift_uses_given_blocks() {
        let image = ProgramImage::builder(InstructionSet::X86_64).build();
        let code = scenario_a();

        let lifted = Lifter::with_options(&image, LiftOptions::minimal()).lift_partitioned(
            &method(),
            &code,
            &[0..1, 1..3],
        );
        assert!(!lifted.is_fault());
        assert_eq!(lifted.blocks.len(), 2);

        let bad = Lifter::new(&image).lift_partitioned(&method(), &code, &[0..2]);
        assert!(bad.is_fault());
    }
}
