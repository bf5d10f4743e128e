//! Branch structuring.
//!
//! A two-way branch whose taken target is reached from nowhere else becomes a structured
//! conditional: the target block moves into the body of the `if` and leaves the top-level
//! block list. When the taken target has other predecessors but the fallthrough block does
//! not, the condition is negated and the fallthrough block is moved instead, followed by a
//! jump to the taken target.
//!
//! An absorbed block that used to fall through to the next block in address order gets an
//! explicit `goto` to it, since its body is no longer adjacent to that block.
//!
//! Planning runs first over all blocks in order; a block is absorbed at most once and
//! never into one of its own descendants. The plan is then materialized depth-first so
//! that nested absorptions are completed before their owner is moved.

use crate::{
    lifter::{
        events::EventKind,
        ir::{Block, BlockGraph, BlockId, BlockKind, Expr, IfBody, Statement, StructureState},
        options::{LiftOptions, LiftPasses},
        passes::{LiftContext, LiftPass},
    },
    Result,
};

/// Planned absorption of one block into its owner's conditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Absorption {
    child: BlockId,
    negate: bool,
}

/// Folds single-predecessor branch targets into structured conditionals.
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchStructuring;

impl BranchStructuring {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        BranchStructuring
    }
}

struct Planner<'g> {
    graph: &'g BlockGraph,
    absorbed_by: Vec<Option<BlockId>>,
}

impl Planner<'_> {
    fn can_absorb(&self, child: BlockId, owner: BlockId) -> bool {
        let Some(block) = self.graph.block(child) else {
            return false;
        };
        if child == 0 || child == owner || self.absorbed_by[child].is_some() {
            return false;
        }
        if block.predecessors.as_slice() != [owner] {
            return false;
        }

        let mut ancestor = owner;
        while let Some(parent) = self.absorbed_by[ancestor] {
            if parent == child {
                return false;
            }
            ancestor = parent;
        }
        true
    }
}

fn plan(graph: &mut BlockGraph) -> Vec<Option<Absorption>> {
    let count = graph.len();
    let mut plans = vec![None; count];
    let mut states = vec![StructureState::Unvisited; count];

    let mut planner = Planner {
        graph: &*graph,
        absorbed_by: vec![None; count],
    };

    for id in 0..count {
        let block = &planner.graph.blocks()[id];
        let (Some(taken), Some(fallthrough)) = (block.taken(), block.fallthrough()) else {
            continue;
        };
        if !ends_in_branch(block) {
            continue;
        }
        states[id] = StructureState::Candidate;

        let choice = if planner.can_absorb(taken, id) {
            Some(Absorption {
                child: taken,
                negate: false,
            })
        } else if planner.can_absorb(fallthrough, id) {
            Some(Absorption {
                child: fallthrough,
                negate: true,
            })
        } else {
            None
        };

        if let Some(absorption) = choice {
            planner.absorbed_by[absorption.child] = Some(id);
            states[absorption.child] = StructureState::Absorbed;
            plans[id] = Some(absorption);
        }
    }

    for (block, state) in graph.blocks_mut().iter_mut().zip(states) {
        block.state = match state {
            StructureState::Absorbed => StructureState::Absorbed,
            _ => StructureState::Retained,
        };
    }
    plans
}

fn ends_in_branch(block: &Block) -> bool {
    matches!(
        block.live_statements().last().map(|s| &s.expr),
        Some(Expr::If {
            body: IfBody::Goto(_),
            ..
        })
    )
}

/// Start index of the block that `block` falls through to, if it can fall through.
fn fallthrough_start(graph: &BlockGraph, block: &Block) -> Option<usize> {
    let next = match block.kind {
        BlockKind::Continue => block.successors.first(),
        BlockKind::If => block.successors.get(1),
        BlockKind::Jump | BlockKind::Interrupt => None,
    }?;
    graph.block(*next).map(|b| b.start)
}

fn negate(condition: Expr) -> Expr {
    match condition {
        Expr::Compare { kind, left, right } => match kind.negate() {
            Some(kind) => Expr::Compare { kind, left, right },
            None => Expr::Not(Box::new(Expr::Compare { kind, left, right })),
        },
        Expr::Not(inner) => *inner,
        other => Expr::Not(Box::new(other)),
    }
}

struct Materializer<'c, 'a> {
    ctx: &'c mut LiftContext<'a>,
    plans: Vec<Option<Absorption>>,
    done: Vec<bool>,
}

impl Materializer<'_, '_> {
    fn materialize(&mut self, owner: BlockId) {
        if self.done[owner] {
            return;
        }
        self.done[owner] = true;

        let Some(Absorption { child, negate: flip }) = self.plans[owner] else {
            return;
        };
        self.materialize(child);

        let graph = &mut self.ctx.graph;
        let resume = graph.block(child).and_then(|b| fallthrough_start(graph, b));
        let Some(original) = graph.block_mut(child) else {
            return;
        };
        let mut body = original.clone();
        original.statements.clear();
        original.ignore = true;
        original.state = StructureState::Absorbed;

        if !body.ends_in_jump() {
            if let Some(start) = resume {
                body.statements.push(Statement::new(Expr::Goto(start), None));
            }
        }

        let taken_start = graph
            .block(owner)
            .and_then(|b| b.taken())
            .and_then(|t| graph.block(t))
            .map(|t| t.start);

        let Some(block) = graph.block_mut(owner) else {
            return;
        };
        let Some(branch) = block.branch_mut() else {
            return;
        };
        let Expr::If { condition, .. } = std::mem::replace(branch, Expr::Nop) else {
            return;
        };
        let condition = if flip { negate(*condition) } else { *condition };
        *branch = Expr::If {
            condition: Box::new(condition),
            body: IfBody::Block(Box::new(body)),
        };
        if flip {
            if let Some(start) = taken_start {
                block.statements.push(Statement::new(Expr::Goto(start), None));
            }
        }

        log::trace!("{}: absorbed B{} into B{}", self.ctx.method, child, owner);
        self.ctx
            .events
            .record(EventKind::BlockAbsorbed)
            .block(child)
            .pass("branches")
            .message(format!("B{child} into B{owner}{}", if flip { " (negated)" } else { "" }));
    }
}

impl LiftPass for BranchStructuring {
    fn name(&self) -> &'static str {
        "branches"
    }

    fn should_run(&self, options: &LiftOptions) -> bool {
        options.enabled(LiftPasses::STRUCTURE)
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let plans = plan(&mut ctx.graph);
        if plans.iter().all(Option::is_none) {
            return Ok(false);
        }

        let count = plans.len();
        let mut materializer = Materializer {
            ctx,
            plans,
            done: vec![false; count],
        };
        for id in 0..count {
            materializer.materialize(id);
        }
        Ok(true)
    }

    fn description(&self) -> &'static str {
        "Structure single-predecessor branches"
    }
}
