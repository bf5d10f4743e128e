//! Rewriting passes over lifted blocks.
//!
//! Every pass implements [`LiftPass`] and mutates a [`LiftContext`] in place, reporting
//! whether it changed anything. The [`PassScheduler`] runs a group of passes repeatedly
//! until a full round makes no change or its iteration cap is reached.
//!
//! # Pipeline
//!
//! 1. [`VariablePromotion`] replaces registers with synthetic variables and names them
//! 2. [`DataFlow`], [`MetadataInliner`], [`StringInliner`] and [`ConstantFolder`] run to
//!    a shared fixed point
//! 3. [`ExpressionInliner`] substitutes single-use variables, once or to a fixed point
//! 4. [`BranchStructuring`] absorbs single-predecessor branch targets
//! 5. [`LabelCounter`] counts jump references so emission knows which labels to print

mod branches;
mod dataflow;
mod fold;
mod inliner;
mod labels;
mod metadata;
mod strings;
mod variables;

pub use branches::BranchStructuring;
pub use dataflow::DataFlow;
pub use fold::ConstantFolder;
pub use inliner::ExpressionInliner;
pub use labels::LabelCounter;
pub use metadata::MetadataInliner;
pub use strings::StringInliner;
pub use variables::VariablePromotion;

use crate::{
    lifter::{
        events::{EventKind, EventLog},
        ir::{BlockGraph, Expr, VariableTable},
        options::LiftOptions,
    },
    program::{MethodDef, Program},
    Result,
};

/// Mutable state of one method moving through the pipeline.
pub struct LiftContext<'a> {
    /// Method being lifted
    pub method: &'a MethodDef,
    /// Program the method belongs to
    pub program: &'a dyn Program,
    /// Active configuration
    pub options: &'a LiftOptions,
    /// Blocks and their statements
    pub graph: BlockGraph,
    /// Variables introduced by promotion
    pub variables: VariableTable,
    /// Events recorded by the passes
    pub events: EventLog,
}

impl<'a> LiftContext<'a> {
    /// Creates a context over an already transformed block graph.
    #[must_use]
    pub fn new(
        method: &'a MethodDef,
        program: &'a dyn Program,
        options: &'a LiftOptions,
        graph: BlockGraph,
        events: EventLog,
    ) -> Self {
        LiftContext {
            method,
            program,
            options,
            graph,
            variables: VariableTable::new(),
            events,
        }
    }

    /// Rewrites every live top-level statement with `f`.
    ///
    /// Returns `true` if any statement changed.
    pub fn rewrite_statements<F>(&mut self, mut f: F) -> bool
    where
        F: FnMut(Expr) -> Expr,
    {
        let mut changed = false;
        for block in self.graph.blocks_mut() {
            for statement in block.statements.iter_mut().filter(|s| !s.eliminated) {
                let before = statement.expr.clone();
                statement.expr.rewrite_in_place(&mut f);
                changed |= statement.expr != before;
            }
        }
        changed
    }
}

/// A rewriting pass over one lifted method.
pub trait LiftPass: Send + Sync {
    /// Unique name for logging and events.
    fn name(&self) -> &'static str;

    /// Should this pass run under `options`?
    fn should_run(&self, _options: &LiftOptions) -> bool {
        true
    }

    /// Runs the pass once.
    ///
    /// Returns `true` if the method changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the method's IR is inconsistent; the caller contains it.
    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// Runs a group of passes to a fixed point.
pub struct PassScheduler {
    max_iterations: usize,
    passes: Vec<Box<dyn LiftPass>>,
}

impl PassScheduler {
    /// Creates an empty scheduler that gives up after `max_iterations` rounds.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        PassScheduler {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Appends a pass; passes run in insertion order within a round.
    #[must_use]
    pub fn with(mut self, pass: impl LiftPass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of scheduled passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if no pass is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every enabled pass once.
    ///
    /// # Errors
    ///
    /// Propagates the first pass error.
    pub fn run_once(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let mut changed = false;
        for pass in &self.passes {
            if !pass.should_run(ctx.options) {
                continue;
            }

            if pass.run(ctx)? {
                log::trace!("{}: {} changed the method", ctx.method, pass.name());
                ctx.events
                    .record(EventKind::PassCompleted)
                    .pass(pass.name())
                    .message(pass.description());
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Runs rounds until one makes no change.
    ///
    /// Returns the number of rounds that changed the method. Hitting the iteration cap is
    /// not an error; it is recorded as [`EventKind::IterationLimit`].
    ///
    /// # Errors
    ///
    /// Propagates the first pass error.
    pub fn run_to_fixpoint(&self, ctx: &mut LiftContext<'_>) -> Result<usize> {
        for round in 0..self.max_iterations {
            if !self.run_once(ctx)? {
                return Ok(round);
            }
        }

        if !self.passes.is_empty() {
            log::warn!(
                "{}: no fixed point after {} rounds",
                ctx.method,
                self.max_iterations
            );
            ctx.events
                .record(EventKind::IterationLimit)
                .message(format!("stopped after {} rounds", self.max_iterations));
        }
        Ok(self.max_iterations)
    }
}
