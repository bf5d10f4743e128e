//! Register-to-variable promotion.
//!
//! Walks the block graph depth-first from the entry block, keeping one stack of
//! variables per canonical register. A write always pushes a fresh variable; a read uses
//! the top of the register's stack, or creates a variable when the register has no
//! binding yet. Each successor receives its own copy of the state as it stood at the end
//! of the predecessor that reached it first; bindings of other predecessors are not
//! merged. Blocks unreachable from the entry are promoted afterwards with empty state.
//!
//! The stack pointer is never promoted. Once promotion is done every variable without a
//! name gets `var_<register>`, suffixed `_1`, `_2`, ... for later definitions.

use std::collections::{HashMap, HashSet};

use crate::{
    lifter::{
        canonical::stack_pointer,
        convention::CallingConvention,
        ir::{Expr, Value, VarId, Variable, VariableTable},
        options::LiftPasses,
        passes::{LiftContext, LiftPass},
    },
    program::TypeRef,
    Result,
};

type Bindings = HashMap<String, Vec<VarId>>;

/// Replaces register reads and writes with synthetic variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariablePromotion;

impl VariablePromotion {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        VariablePromotion
    }
}

impl LiftPass for VariablePromotion {
    fn name(&self) -> &'static str {
        "variables"
    }

    fn run(&self, ctx: &mut LiftContext<'_>) -> Result<bool> {
        let sp = stack_pointer(ctx.program.instruction_set());
        let entry = if ctx.options.enabled(LiftPasses::SEED_PARAMETERS) {
            seed_entry(ctx)
        } else {
            Bindings::new()
        };

        let count = ctx.graph.len();
        let mut visited = vec![false; count];
        let mut changed = false;

        let mut stack = Vec::new();
        if count > 0 {
            stack.push((0, entry));
        }

        while let Some((id, mut bindings)) = stack.pop() {
            if visited[id] {
                continue;
            }
            visited[id] = true;

            changed |= promote_block(ctx, id, &mut bindings, sp);

            let successors = ctx.graph.blocks()[id].successors.clone();
            for &succ in successors.iter().rev() {
                if !visited[succ] {
                    stack.push((succ, bindings.clone()));
                }
            }
        }

        for id in 0..count {
            if !visited[id] {
                changed |= promote_block(ctx, id, &mut Bindings::new(), sp);
            }
        }

        assign_names(&mut ctx.variables);
        log::debug!("{}: promoted to {} variables", ctx.method, ctx.variables.len());
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Promote registers to variables"
    }
}

/// Binds `this` and the register-passed parameters in the entry state.
fn seed_entry(ctx: &mut LiftContext<'_>) -> Bindings {
    let method = ctx.method;
    let convention = CallingConvention::of(ctx.program.instruction_set());

    let receiver = (!method.is_static).then_some(TypeRef::Object);
    let types = receiver
        .iter()
        .chain(method.parameters.iter().map(|p| &p.param_type));
    let registers = convention.assign(types);

    let mut bindings = Bindings::new();
    let mut registers = registers.into_iter();

    if !method.is_static {
        if let Some(Some(register)) = registers.next() {
            let id = ctx.variables.insert(Variable {
                name: "this".to_string(),
                ty: method.this_type(),
                is_keyword: true,
                register: register.to_string(),
                parameter: None,
            });
            bindings.entry(register.to_string()).or_default().push(id);
        }
    }

    for ((position, parameter), register) in method.parameters.iter().enumerate().zip(registers) {
        let Some(register) = register else {
            continue;
        };
        let id = ctx.variables.insert(Variable {
            name: parameter.name.clone(),
            ty: Some(parameter.param_type.clone()),
            is_keyword: false,
            register: register.to_string(),
            parameter: Some(position),
        });
        bindings.entry(register.to_string()).or_default().push(id);
    }

    bindings
}

fn promote_block(ctx: &mut LiftContext<'_>, id: usize, bindings: &mut Bindings, sp: &str) -> bool {
    let Some(block) = ctx.graph.block_mut(id) else {
        return false;
    };

    let mut changed = false;
    for statement in &mut block.statements {
        let expr = std::mem::replace(&mut statement.expr, Expr::Nop);
        let (expr, promoted) = promote(expr, bindings, &mut ctx.variables, sp);
        statement.expr = expr;
        changed |= promoted;
    }
    changed
}

/// Promotes one statement: reads first, then a register assignment target.
fn promote(expr: Expr, bindings: &mut Bindings, variables: &mut VariableTable, sp: &str) -> (Expr, bool) {
    let mut changed = false;

    let expr = match expr {
        Expr::Assign { target, value } => {
            let value = promote_reads(*value, bindings, variables, sp, &mut changed);
            let target = match *target {
                Expr::Value(Value::Register(register)) if register != sp => {
                    changed = true;
                    let id = variables.create(&register);
                    bindings.entry(register).or_default().push(id);
                    Expr::var(id)
                }
                other => promote_reads(other, bindings, variables, sp, &mut changed),
            };
            Expr::assign(target, value)
        }
        other => promote_reads(other, bindings, variables, sp, &mut changed),
    };

    (expr, changed)
}

fn promote_reads(
    expr: Expr,
    bindings: &mut Bindings,
    variables: &mut VariableTable,
    sp: &str,
    changed: &mut bool,
) -> Expr {
    expr.rewrite(&mut |node| match node {
        Expr::Value(Value::Register(register)) if register != sp => {
            *changed = true;
            let id = match bindings.get(&register).and_then(|stack| stack.last()) {
                Some(id) => *id,
                None => {
                    let id = variables.create(&register);
                    bindings.entry(register).or_default().push(id);
                    id
                }
            };
            Expr::var(id)
        }
        other => other,
    })
}

/// Gives every unnamed variable a stable `var_<register>[_k]` name.
fn assign_names(variables: &mut VariableTable) {
    let mut taken: HashSet<String> = variables
        .iter()
        .filter(|(_, v)| !v.name.is_empty())
        .map(|(_, v)| v.name.clone())
        .collect();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();

    for variable in variables.iter_mut().filter(|v| v.name.is_empty()) {
        let suffix = next_suffix.entry(variable.register.clone()).or_insert(0);
        let name = loop {
            let candidate = if *suffix == 0 {
                format!("var_{}", variable.register)
            } else {
                format!("var_{}_{}", variable.register, suffix)
            };
            *suffix += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(name.clone());
        variable.name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        isil::{Mnemonic, Operand},
        lifter::ir::MathOp,
        program::{MethodDef, MethodId, TypeId},
        test::{insn, live, Fixture},
    };

    #[test]
    fn test_writes_push_fresh_variables() {
        // rax = 5; rax = rax + 3; return rax
        let fixture = Fixture::new(vec![
            insn(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]),
            insn(1, Mnemonic::Add, vec![Operand::reg("eax"), Operand::reg("eax"), Operand::imm(3)]),
            insn(2, Mnemonic::Return, vec![Operand::reg("eax")]),
        ]);
        let ctx = fixture.promoted();

        let v0 = ctx.variables.find("var_rax").unwrap();
        let v1 = ctx.variables.find("var_rax_1").unwrap();
        assert_eq!(
            live(&ctx, 0),
            vec![
                Expr::assign(Expr::var(v0), Expr::imm(5)),
                Expr::assign(Expr::var(v1), Expr::math(MathOp::Add, Expr::var(v0), Expr::imm(3))),
                Expr::Return(Some(Box::new(Expr::var(v1)))),
            ]
        );
    }

    #[test]
    fn test_read_before_write_creates_variable() {
        let fixture = Fixture::new(vec![insn(0, Mnemonic::Return, vec![Operand::reg("r8d")])]);
        let ctx = fixture.promoted();

        let v = ctx.variables.find("var_r8").unwrap();
        assert_eq!(live(&ctx, 0), vec![Expr::Return(Some(Box::new(Expr::var(v))))]);
    }

    #[test]
    fn test_stack_pointer_is_not_promoted() {
        let fixture = Fixture::new(vec![
            insn(0, Mnemonic::ShiftStack, vec![Operand::imm(-0x28)]),
            insn(1, Mnemonic::Return, vec![]),
        ]);
        let ctx = fixture.promoted();

        assert!(ctx.variables.is_empty());
        assert_eq!(
            live(&ctx, 0)[0],
            Expr::assign(Expr::reg("rsp"), Expr::math(MathOp::Add, Expr::reg("rsp"), Expr::imm(-0x28)))
        );
    }

    #[test]
    fn test_sibling_branches_do_not_share_writes() {
        // 0: cmp ecx, 0; 1: je 4; 2: mov eax, 1; 3: ret eax; 4: ret eax
        let fixture = Fixture::new(vec![
            insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
            insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(4)]),
            insn(2, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
            insn(3, Mnemonic::Return, vec![Operand::reg("eax")]),
            insn(4, Mnemonic::Return, vec![Operand::reg("eax")]),
        ]);
        let ctx = fixture.promoted();

        // The taken branch (block 2) is promoted first and reads rax without a binding.
        let taken = live(&ctx, 2);
        let Expr::Return(Some(taken_read)) = &taken[0] else {
            panic!("expected return");
        };
        let fallthrough = live(&ctx, 1);
        let Expr::Assign { target, .. } = &fallthrough[0] else {
            panic!("expected assignment");
        };

        assert_eq!(taken_read.as_variable(), ctx.variables.find("var_rax"));
        assert_eq!(target.as_variable(), ctx.variables.find("var_rax_1"));
    }

    #[test]
    fn test_first_visited_predecessor_wins_at_join() {
        // 0: cmp; 1: je 4; 2: mov eax, 1; 3: goto 5; 4: mov eax, 2; 5: ret eax
        let fixture = Fixture::new(vec![
            insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
            insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(4)]),
            insn(2, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
            insn(3, Mnemonic::Goto, vec![Operand::target(5)]),
            insn(4, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(2)]),
            insn(5, Mnemonic::Return, vec![Operand::reg("eax")]),
        ]);
        let ctx = fixture.promoted();

        // Block 2 (instruction 4) is the taken target, visited first, and reaches the join.
        let taken = live(&ctx, 2);
        let Expr::Assign { target, .. } = &taken[0] else {
            panic!("expected assignment");
        };
        let join = live(&ctx, 3);
        let Expr::Return(Some(read)) = &join[0] else {
            panic!("expected return");
        };
        assert_eq!(read.as_variable(), target.as_variable());
    }

    #[test]
    fn test_entry_seeding_binds_this_and_parameters() {
        let method = MethodDef::new(MethodId(2), "Scale", "Vector")
            .instance_of(TypeId(4))
            .with_parameter("factor", TypeRef::R4)
            .with_parameter("count", TypeRef::I4);
        let fixture = Fixture::new(vec![
            insn(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::reg("r8d")]),
            insn(1, Mnemonic::Move, vec![Operand::reg("rdx"), Operand::reg("rcx")]),
            insn(2, Mnemonic::Return, vec![Operand::reg("xmm1")]),
        ])
        .method(method);
        let ctx = fixture.promoted();

        let this = ctx.variables.find("this").unwrap();
        let factor = ctx.variables.find("factor").unwrap();
        let count = ctx.variables.find("count").unwrap();
        assert!(ctx.variables.get(this).unwrap().is_keyword);
        assert_eq!(ctx.variables.type_of(this), Some(&TypeRef::Class(TypeId(4))));
        assert_eq!(ctx.variables.get(factor).unwrap().register, "xmm1");
        assert_eq!(ctx.variables.get(count).unwrap().parameter, Some(1));

        let statements = live(&ctx, 0);
        assert_eq!(statements[0], Expr::assign(Expr::var(VarId(3)), Expr::var(count)));
        let Expr::Assign { value, .. } = &statements[1] else {
            panic!("expected assignment");
        };
        assert_eq!(value.as_variable(), Some(this));
        assert_eq!(statements[2], Expr::Return(Some(Box::new(Expr::var(factor)))));
    }

    #[test]
    fn test_seeding_can_be_disabled() {
        let method = MethodDef::new(MethodId(2), "Get", "Box").instance_of(TypeId(4));
        let fixture = Fixture::new(vec![insn(0, Mnemonic::Return, vec![Operand::reg("rcx")])])
            .method(method)
            .options(crate::lifter::LiftOptions::minimal());
        let ctx = fixture.promoted();

        assert!(ctx.variables.find("this").is_none());
        assert!(ctx.variables.find("var_rcx").is_some());
    }

    #[test]
    fn test_unreachable_blocks_are_promoted() {
        let fixture = Fixture::new(vec![
            insn(0, Mnemonic::Return, vec![]),
            insn(1, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
            insn(2, Mnemonic::Return, vec![Operand::reg("eax")]),
        ]);
        let ctx = fixture.promoted();

        let statements = live(&ctx, 1);
        assert!(statements
            .iter()
            .all(|s| !s.any(|e| matches!(e, Expr::Value(Value::Register(_))))));
    }

    #[test]
    fn test_names_skip_taken_names() {
        let mut table = VariableTable::new();
        table.insert(Variable {
            name: "var_rax".to_string(),
            ty: None,
            is_keyword: false,
            register: "rcx".to_string(),
            parameter: Some(0),
        });
        let a = table.create("rax");
        let b = table.create("rax");
        assign_names(&mut table);

        assert_eq!(table.name(a), "var_rax_1");
        assert_eq!(table.name(b), "var_rax_2");
    }
}
