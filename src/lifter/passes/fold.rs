//! Constant folding of arithmetic on immediates.

use crate::{
    lifter::{
        events::EventKind,
        ir::Expr,
        options::{LiftOptions, LiftPasses},
        passes::{LiftContext, LiftPass},
    },
    Result,
};

/// Folds `imm op imm` and `~imm` into a single immediate.
///
/// Division by zero and out-of-range shifts are left unfolded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantFolder;

impl ConstantFolder {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        ConstantFolder
    }
}

/// Folds one node whose children are already folded.
///
/// Returns the node and whether it was folded.
fn fold(node: Expr) -> (Expr, bool) {
    match node {
        Expr::Math { op, left, right } => {
            let folded = match (left.as_immediate(), right.as_immediate()) {
                (Some(a), Some(b)) => op.fold(a, b),
                _ => None,
            };
            match folded {
                Some(value) => (Expr::imm(value), true),
                None => (Expr::Math { op, left, right }, false),
            }
        }
        Expr::Not(inner) => match inner.as_immediate() {
            Some(value) => (Expr::imm(!value), true),
            None => (Expr::Not(inner), false),
        },
        other => (other, false),
    }
}

impl LiftPass for ConstantFolder {
    fn name(&self) -> &'static str {
        "fold"
    }

    fn should_run(&self, options: &LiftOptions) -> bool {
        options.enabled(LiftPasses::FOLD_CONSTANTS)
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let events = &ctx.events;
        let mut changed = false;

        for block in ctx.graph.blocks_mut() {
            let id = block.id;
            for statement in block.statements.iter_mut().filter(|s| !s.eliminated) {
                statement
                    .expr
                    .rewrite_in_place(&mut |node| {
                        let (node, folded) = fold(node);
                        if folded {
                            changed = true;
                            events
                                .record(EventKind::ConstantFolded)
                                .block(id)
                                .pass("fold");
                        }
                        node
                    });
            }
        }

        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Fold constant arithmetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifter::ir::MathOp;

    #[test]
    fn test_nested_fold() {
        // (2 + 3) * 4
        let expr = Expr::math(
            MathOp::Mul,
            Expr::math(MathOp::Add, Expr::imm(2), Expr::imm(3)),
            Expr::imm(4),
        );
        let folded = expr.rewrite(&mut |node| fold(node).0);
        assert_eq!(folded, Expr::imm(20));
    }

    #[test]
    fn test_unfoldable_shapes() {
        let by_zero = Expr::math(MathOp::Div, Expr::imm(1), Expr::imm(0));
        assert_eq!(fold(by_zero.clone()), (by_zero, false));

        let mixed = Expr::math(MathOp::Add, Expr::reg("rax"), Expr::imm(1));
        assert_eq!(fold(mixed.clone()), (mixed, false));

        assert_eq!(fold(Expr::Not(Box::new(Expr::imm(0)))), (Expr::imm(-1), true));
    }
}
