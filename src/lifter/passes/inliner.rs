//! Single-use variable inlining.
//!
//! Counts, for every variable, its writes, its plain reads and its uses as a direct call
//! argument. A variable written exactly once and used exactly once (one read and no
//! argument use, or one argument use and no read), whose assigned value is a variable or
//! a constant, has its defining statement eliminated and its use replaced by that value.
//!
//! One run does not revisit statements whose values became constant through the same run;
//! copy chains that only appear after folding need another run.
//!
//! Counting sees the variables promotion produced, and promotion carries only the
//! first-visited predecessor's bindings into a join. When both arms of an if/else write
//! the same register, the join reads the first arm's variable, so that variable looks
//! single-use and is inlined while the other arm's write remains as a dead assignment.

use std::collections::{HashMap, HashSet};

use crate::{
    lifter::{
        events::EventKind,
        ir::{BlockGraph, BlockId, Expr, VarId},
        options::{LiftOptions, LiftPasses},
        passes::{LiftContext, LiftPass},
    },
    Result,
};

/// Where and how often a variable is used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Usage {
    writes: usize,
    reads: usize,
    arguments: usize,
    /// Block and statement position of the last write
    definition: Option<(BlockId, usize)>,
}

impl Usage {
    fn single_use(&self) -> bool {
        self.writes == 1
            && ((self.reads == 1 && self.arguments == 0) || (self.reads == 0 && self.arguments == 1))
    }
}

/// Substitutes single-definition, single-use variables into their use site.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionInliner;

impl ExpressionInliner {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        ExpressionInliner
    }
}

fn count_uses(expr: &Expr, usage: &mut HashMap<VarId, Usage>) {
    let mut pending_arguments: HashMap<VarId, usize> = HashMap::new();
    expr.walk(&mut |node| match node {
        Expr::Call { arguments, .. } => {
            for var in arguments.iter().filter_map(Expr::as_variable) {
                usage.entry(var).or_default().arguments += 1;
                *pending_arguments.entry(var).or_default() += 1;
            }
        }
        Expr::Value(value) => {
            let Some(var) = value.as_variable() else {
                return;
            };
            match pending_arguments.get_mut(&var) {
                Some(pending) if *pending > 0 => *pending -= 1,
                _ => usage.entry(var).or_default().reads += 1,
            }
        }
        _ => {}
    });
}

fn collect(graph: &BlockGraph) -> HashMap<VarId, Usage> {
    let mut usage: HashMap<VarId, Usage> = HashMap::new();

    for block in graph.blocks() {
        for (position, statement) in block.statements.iter().enumerate() {
            if statement.eliminated {
                continue;
            }
            match &statement.expr {
                Expr::Assign { target, value } if target.as_variable().is_some() => {
                    if let Some(var) = target.as_variable() {
                        let entry = usage.entry(var).or_default();
                        entry.writes += 1;
                        entry.definition = Some((block.id, position));
                    }
                    count_uses(value, &mut usage);
                }
                other => count_uses(other, &mut usage),
            }
        }
    }

    usage
}

/// Follows replacements until reaching a value that is not itself replaced.
fn resolve(var: VarId, replacements: &HashMap<VarId, Expr>) -> Option<Expr> {
    let mut visited = HashSet::new();
    let mut current = replacements.get(&var)?;
    visited.insert(var);

    while let Some(next) = current.as_variable() {
        if !visited.insert(next) {
            break;
        }
        match replacements.get(&next) {
            Some(expr) => current = expr,
            None => break,
        }
    }

    Some(current.clone())
}

impl LiftPass for ExpressionInliner {
    fn name(&self) -> &'static str {
        "inliner"
    }

    fn should_run(&self, options: &LiftOptions) -> bool {
        options.enabled(LiftPasses::INLINE)
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let usage = collect(&ctx.graph);

        let mut replacements: HashMap<VarId, Expr> = HashMap::new();
        let mut candidates: Vec<_> = usage
            .iter()
            .filter(|(_, u)| u.single_use())
            .filter_map(|(var, u)| Some((*var, u.definition?)))
            .collect();
        candidates.sort_unstable();

        for (var, (block, position)) in candidates {
            let Some(statement) = ctx
                .graph
                .block_mut(block)
                .and_then(|b| b.statements.get_mut(position))
            else {
                continue;
            };
            let Expr::Assign { value, .. } = &statement.expr else {
                continue;
            };
            let inlinable = value.as_variable().is_some()
                || value.as_value().is_some_and(|v| v.is_constant());
            if !inlinable {
                continue;
            }

            replacements.insert(var, (**value).clone());
            statement.eliminated = true;
            ctx.events
                .record(EventKind::VariableInlined)
                .block(block)
                .pass("inliner")
                .message(ctx.variables.name(var).to_string());
        }

        if replacements.is_empty() {
            return Ok(false);
        }

        ctx.rewrite_statements(|node| match node.as_variable() {
            Some(var) => resolve(var, &replacements).unwrap_or(node),
            None => node,
        });
        Ok(true)
    }

    fn description(&self) -> &'static str {
        "Inline single-use variables"
    }
}
