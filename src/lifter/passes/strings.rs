//! String literal inlining.
//!
//! `*(addr)` where `addr` points at a printable NUL-terminated string becomes the literal.
//! Addresses at or below [`LiftOptions::min_string_address`] are never tried, so small
//! constants that happen to be dereferenced are not mistaken for string pointers. Stores
//! through such an address keep their `*(addr)` target.

use crate::{
    lifter::{
        events::EventKind,
        ir::{Expr, Value},
        options::{LiftOptions, LiftPasses},
        passes::{LiftContext, LiftPass},
    },
    Result,
};

/// Replaces dereferenced string addresses with string literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringInliner;

impl StringInliner {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        StringInliner
    }
}

impl LiftPass for StringInliner {
    fn name(&self) -> &'static str {
        "strings"
    }

    fn should_run(&self, options: &LiftOptions) -> bool {
        options.enabled(LiftPasses::STRINGS)
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let program = ctx.program;
        let min_address = ctx.options.min_string_address;
        let events = &ctx.events;
        let mut changed = false;

        for block in ctx.graph.blocks_mut() {
            let id = block.id;
            for statement in block.statements.iter_mut().filter(|s| !s.eliminated) {
                statement.expr.rewrite_loads_in_place(&mut |node| {
                    let Expr::Deref(inner) = node else {
                        return node;
                    };

                    if matches!(inner.as_value(), Some(Value::LoadString(_))) {
                        changed = true;
                        return *inner;
                    }

                    let literal = inner
                        .as_immediate()
                        .and_then(|address| u64::try_from(address).ok())
                        .filter(|address| *address > min_address)
                        .and_then(|address| program.string_literal_at(address));

                    match literal {
                        Some(literal) => {
                            changed = true;
                            events
                                .record(EventKind::StringInlined)
                                .block(id)
                                .pass("strings")
                                .message(format!("{literal:?}"));
                            Expr::Value(Value::LoadString(literal))
                        }
                        None => Expr::Deref(inner),
                    }
                });
            }
        }

        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Inline string literals"
    }
}
