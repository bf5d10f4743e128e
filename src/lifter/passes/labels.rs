//! Jump reference counting.

use crate::{
    lifter::{
        ir::{BlockGraph, Expr, IfBody},
        passes::{LiftContext, LiftPass},
    },
    Result,
};

/// Counts how many jumps name each block so emission can skip unused labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelCounter;

impl LabelCounter {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        LabelCounter
    }
}

fn jump_targets(graph: &BlockGraph) -> Vec<usize> {
    let mut targets = Vec::new();
    for block in graph.blocks().iter().filter(|b| !b.ignore) {
        for statement in block.live_statements() {
            statement.expr.walk(&mut |node| match node {
                Expr::Goto(target)
                | Expr::If {
                    body: IfBody::Goto(target),
                    ..
                } => targets.push(*target),
                _ => {}
            });
        }
    }
    targets
}

impl LiftPass for LabelCounter {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let before: Vec<usize> = ctx.graph.blocks().iter().map(|b| b.references).collect();
        let targets = jump_targets(&ctx.graph);

        for block in ctx.graph.blocks_mut() {
            block.references = 0;
        }
        for start in targets {
            match ctx.graph.block_starting_at(start) {
                Some(id) => {
                    if let Some(block) = ctx.graph.block_mut(id) {
                        block.references += 1;
                    }
                }
                None => log::debug!("jump to {start} names no block start"),
            }
        }

        Ok(ctx
            .graph
            .blocks()
            .iter()
            .zip(before)
            .any(|(block, old)| block.references != old))
    }

    fn description(&self) -> &'static str {
        "Count jump references per block"
    }
}
