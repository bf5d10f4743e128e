//! Metadata usage inlining.
//!
//! Compiled code reaches types, methods, fields and string literals through global
//! usage slots. An immediate that names such a slot, either directly or through the
//! pointer stored at it, is replaced by the resolved [`MetadataUsage`]. Only immediates in
//! value positions are considered: loads (`*(addr)`), assigned values, call arguments and
//! comparison operands. Arithmetic operands are offsets and are left alone. A store to a
//! slot keeps writing through memory: `*(addr) = x` becomes `*(usage) = x`.

use crate::{
    lifter::{
        events::{EventKind, EventLog},
        ir::{BlockId, Expr, Value},
        options::{LiftOptions, LiftPasses},
        passes::{LiftContext, LiftPass},
    },
    program::{MetadataUsage, Program},
    Result,
};

/// Replaces addresses of metadata usage slots with the usage they hold.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataInliner;

impl MetadataInliner {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        MetadataInliner
    }
}

struct Resolver<'a> {
    program: &'a dyn Program,
    min_address: u64,
    events: &'a EventLog,
    block: BlockId,
    changed: bool,
}

impl Resolver<'_> {
    fn usage(&self, value: i64) -> Option<MetadataUsage> {
        let address = u64::try_from(value).ok().filter(|a| *a > self.min_address)?;
        self.program.global_at(address).or_else(|| {
            self.program
                .read_pointer(address)
                .and_then(|pointer| self.program.global_at(pointer))
        })
    }

    fn inline(&mut self, value: i64) -> Option<Expr> {
        let usage = self.usage(value)?;
        self.changed = true;
        self.events
            .record(EventKind::MetadataInlined)
            .block(self.block)
            .pass("metadata")
            .message(format!("0x{value:X} -> {usage:?}"));
        Some(Expr::Value(Value::Metadata(usage)))
    }

    fn leaf(&mut self, expr: Expr) -> Expr {
        match expr.as_immediate() {
            Some(value) => self.inline(value).unwrap_or(expr),
            None => expr,
        }
    }

    fn rewrite(&mut self, node: Expr) -> Expr {
        match node {
            Expr::Deref(inner) => {
                if let Some(address) = inner.as_immediate() {
                    return self.inline(address).unwrap_or(Expr::Deref(inner));
                }
                if matches!(inner.as_value(), Some(Value::Metadata(_))) {
                    return *inner;
                }
                Expr::Deref(inner)
            }
            Expr::Assign { target, value } => {
                let target = match *target {
                    Expr::Deref(address) => Expr::Deref(Box::new(self.leaf(*address))),
                    other => other,
                };
                Expr::Assign {
                    target: Box::new(target),
                    value: Box::new(self.leaf(*value)),
                }
            }
            Expr::Call {
                target,
                arguments,
                returns,
            } => Expr::Call {
                target,
                arguments: arguments.into_iter().map(|arg| self.leaf(arg)).collect(),
                returns,
            },
            Expr::Compare { kind, left, right } => Expr::Compare {
                kind,
                left: Box::new(self.leaf(*left)),
                right: Box::new(self.leaf(*right)),
            },
            other => other,
        }
    }
}

impl LiftPass for MetadataInliner {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn should_run(&self, options: &LiftOptions) -> bool {
        options.enabled(LiftPasses::METADATA)
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let mut changed = false;
        for block in ctx.graph.blocks_mut() {
            let mut resolver = Resolver {
                program: ctx.program,
                min_address: ctx.options.min_string_address,
                events: &ctx.events,
                block: block.id,
                changed: false,
            };
            for statement in block.statements.iter_mut().filter(|s| !s.eliminated) {
                statement
                    .expr
                    .rewrite_loads_in_place(&mut |node| resolver.rewrite(node));
            }
            changed |= resolver.changed;
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Inline metadata usages"
    }
}
