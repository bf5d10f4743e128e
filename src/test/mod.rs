//! Shared fixtures for unit tests.

use crate::{
    isil::{Instruction, InstructionSet, Mnemonic, Operand},
    lifter::{
        passes::{LiftContext, LiftPass, VariablePromotion},
        CfgBuilder, EventLog, Expr, LiftOptions, Transformer,
    },
    program::{MethodDef, MethodId, ProgramImage},
};

/// Shorthand for building an instruction.
pub fn insn(index: usize, mnemonic: Mnemonic, operands: Vec<Operand>) -> Instruction {
    Instruction::new(index, mnemonic, operands)
}

/// A method, its program and its instructions, ready to be lifted stage by stage.
pub struct Fixture {
    pub image: ProgramImage,
    pub method: MethodDef,
    pub options: LiftOptions,
    pub code: Vec<Instruction>,
}

impl Fixture {
    /// Static `void Test.Run()` on an empty x86-64 image.
    pub fn new(code: Vec<Instruction>) -> Self {
        Fixture {
            image: ProgramImage::builder(InstructionSet::X86_64).build(),
            method: MethodDef::new(MethodId(1), "Run", "Test"),
            options: LiftOptions::default(),
            code,
        }
    }

    pub fn image(mut self, image: ProgramImage) -> Self {
        self.image = image;
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.method = method;
        self
    }

    pub fn options(mut self, options: LiftOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the block graph and lifts every instruction.
    pub fn context(&self) -> LiftContext<'_> {
        let mut graph = CfgBuilder::new(&self.code).build().unwrap();
        let events = EventLog::new();
        Transformer::new(&self.image, &self.method, &events)
            .transform(&self.code, &mut graph)
            .unwrap();
        LiftContext::new(&self.method, &self.image, &self.options, graph, events)
    }

    /// [`Fixture::context`] followed by variable promotion.
    pub fn promoted(&self) -> LiftContext<'_> {
        let mut ctx = self.context();
        VariablePromotion::new().run(&mut ctx).unwrap();
        ctx
    }
}

/// Live statement expressions of one block.
pub fn live(ctx: &LiftContext<'_>, block: usize) -> Vec<Expr> {
    ctx.graph.blocks()[block]
        .live_statements()
        .map(|s| s.expr.clone())
        .collect()
}
