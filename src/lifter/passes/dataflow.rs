//! Field recovery and type propagation.
//!
//! Two rules feed each other until nothing changes:
//!
//! - `*(v + offset)` where `v` has a known type becomes `v.field` when the type (or one of
//!   its bases) declares an instance field at that offset. Chains like `*(v.a + 8)` resolve
//!   through the type of `a`.
//! - `v = e` gives `v` the type of `e` when `e` is a field access, a call to a managed
//!   method returning a value, a typed variable or a string literal.
//!
//! Types are only ever added, never replaced, so repeated rounds converge.

use crate::{
    lifter::{
        events::EventKind,
        ir::{Expr, MathOp, Value, VarId, VariableTable},
        options::{LiftOptions, LiftPasses},
        passes::{LiftContext, LiftPass},
    },
    program::{Program, TypeRef},
    Result,
};

/// Recovers field accesses from pointer arithmetic and propagates variable types.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataFlow;

impl DataFlow {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        DataFlow
    }
}

impl LiftPass for DataFlow {
    fn name(&self) -> &'static str {
        "dataflow"
    }

    fn should_run(&self, options: &LiftOptions) -> bool {
        options.enabled(LiftPasses::DATAFLOW)
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let resolved = resolve_fields(ctx);
        let typed = propagate_types(ctx);
        Ok(resolved || typed)
    }

    fn description(&self) -> &'static str {
        "Recover field accesses and propagate types"
    }
}

/// Static type of an expression, where one is known.
fn type_of(expr: &Expr, variables: &VariableTable) -> Option<TypeRef> {
    match expr {
        Expr::Value(Value::Variable(id)) => variables.type_of(*id).cloned(),
        Expr::Value(Value::LoadString(_)) => Some(TypeRef::String),
        Expr::MemberAccess { field, .. } => Some(field.field_type.clone()),
        Expr::Call {
            target, returns: true, ..
        } => match target.as_value() {
            Some(Value::ManagedFunction(method)) => Some(method.return_type.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn resolve_fields(ctx: &mut LiftContext<'_>) -> bool {
    let program: &dyn Program = ctx.program;
    let variables = &ctx.variables;
    let events = &ctx.events;
    let mut changed = false;

    for block in ctx.graph.blocks_mut() {
        let id = block.id;
        for statement in block.statements.iter_mut().filter(|s| !s.eliminated) {
            let source = statement.source;
            statement.expr.rewrite_in_place(&mut |node| {
                let Expr::Deref(address) = node else {
                    return node;
                };
                let (left, right) = match *address {
                    Expr::Math {
                        op: MathOp::Add,
                        left,
                        right,
                    } => (left, right),
                    other => return Expr::deref(other),
                };

                let field = right.as_immediate().and_then(|offset| {
                    let ty = type_of(&left, variables)?;
                    program.field_at_offset(&ty, offset)
                });
                let Some(field) = field else {
                    return Expr::deref(Expr::Math {
                        op: MathOp::Add,
                        left,
                        right,
                    });
                };

                changed = true;
                let event = events
                    .record(EventKind::FieldResolved)
                    .block(id)
                    .pass("dataflow")
                    .message(format!(
                        "+0x{:X} -> {}.{}",
                        field.offset, field.declaring_type_name, field.name
                    ));
                if let Some(source) = source {
                    event.instruction(source);
                }

                Expr::MemberAccess {
                    object: left,
                    field,
                }
            });
        }
    }

    changed
}

fn propagate_types(ctx: &mut LiftContext<'_>) -> bool {
    let mut inferred: Vec<(VarId, TypeRef)> = Vec::new();
    for block in ctx.graph.blocks() {
        for statement in block.live_statements() {
            let Expr::Assign { target, value } = &statement.expr else {
                continue;
            };
            let Some(var) = target.as_variable() else {
                continue;
            };
            if ctx.variables.type_of(var).is_some() {
                continue;
            }
            if let Some(ty) = type_of(value, &ctx.variables).filter(|ty| !ty.is_void()) {
                inferred.push((var, ty));
            }
        }
    }

    let mut changed = false;
    for (var, ty) in inferred {
        let message = format!("{} : {:?}", ctx.variables.name(var), ty);
        if ctx.variables.refine_type(var, ty) {
            ctx.events
                .record(EventKind::TypePropagated)
                .pass("dataflow")
                .message(message);
            changed = true;
        }
    }
    changed
}
