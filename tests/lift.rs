//! End-to-end lifting through the public API.

use std::sync::Arc;

use isilift::{
    isil::{Instruction, InstructionSet, MemoryOperand, Mnemonic, Operand},
    lifter::{
        canonical_register,
        ir::{BlockKind, CompareKind, Expr, IfBody, StructureState, Value},
        CfgBuilder, EventKind, LiftCache, LiftOptions, LiftPasses, Lifter, MethodBody,
    },
    program::{MetadataUsage, MethodDef, MethodId, ProgramImage, TypeDef, TypeId, TypeRef},
    Error, Result,
};

fn insn(index: usize, mnemonic: Mnemonic, operands: Vec<Operand>) -> Instruction {
    Instruction::new(index, mnemonic, operands)
}

fn x64() -> ProgramImage {
    ProgramImage::builder(InstructionSet::X86_64).build()
}

fn run() -> MethodDef {
    MethodDef::new(MethodId(1), "Run", "Test")
}

/// `mov eax, 5; add eax, eax, 3; ret eax`
fn scenario_a() -> Vec<Instruction> {
    vec![
        insn(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]),
        insn(1, Mnemonic::Add, vec![Operand::reg("eax"), Operand::reg("eax"), Operand::imm(3)]),
        insn(2, Mnemonic::Return, vec![Operand::reg("eax")]),
    ]
}

/// A: 0 cmp; 1 je 4    C: 2 mov; 3 ret    B: 4 mov; 5 goto 2
fn scenario_c() -> Vec<Instruction> {
    vec![
        insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
        insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(4)]),
        insn(2, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
        insn(3, Mnemonic::Return, vec![Operand::reg("eax")]),
        insn(4, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(2)]),
        insn(5, Mnemonic::Goto, vec![Operand::target(2)]),
    ]
}

#[test]
fn canonicalization_is_idempotent() {
    let cases = [
        (InstructionSet::X86_64, vec!["al", "ax", "eax", "rax", "r9d", "r15w", "xmm3", "rsp", "sil"]),
        (InstructionSet::Arm64, vec!["w0", "x0", "X0", "s1", "d1", "q1", "v1", "sp", "wsp", "x29"]),
    ];
    for (isa, registers) in cases {
        for register in registers {
            let once = canonical_register(isa, register);
            assert_eq!(canonical_register(isa, &once), once, "{isa:?} {register}");
        }
    }
}

#[test]
fn straight_line_code_is_one_block() -> Result<()> {
    let code = scenario_a();
    let graph = CfgBuilder::new(&code).build()?;

    assert_eq!(graph.len(), 1);
    let block = &graph.blocks()[0];
    assert_eq!(block.instructions, 0..code.len());
    assert_eq!(block.kind, BlockKind::Interrupt);
    Ok(())
}

#[test]
fn cfg_conserves_instructions() -> Result<()> {
    let mut code = scenario_c();
    code.push(insn(6, Mnemonic::Call, vec![Operand::reg("rax")]));
    let graph = CfgBuilder::new(&code).build()?;

    assert_eq!(graph.instruction_count(), code.len());
    let mut covered: Vec<_> = graph.blocks().iter().flat_map(|b| b.instructions.clone()).collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..code.len()).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn scenario_a_default_and_full() {
    let image = x64();
    let code = scenario_a();

    let default = Lifter::new(&image).lift(&run(), &code);
    assert_eq!(default.to_text(), "    var_rax_1 = 8;\n    return var_rax_1;\n");
    assert!(default.events.has(EventKind::VariableInlined));

    let full = Lifter::with_options(&image, LiftOptions::full()).lift(&run(), &code);
    assert_eq!(full.to_text(), "    return 8;\n");
}

#[test]
fn inliner_replaces_the_read_with_the_written_value() {
    let image = x64();
    let options = LiftOptions::minimal().with(LiftPasses::INLINE, true);
    let lifted = Lifter::with_options(&image, options).lift(&run(), &scenario_a());

    let block = &lifted.blocks[0];
    assert!(block.statements[0].eliminated);
    assert!(!block.statements[1].eliminated);
    assert_eq!(lifted.to_text(), "    var_rax_1 = 5 + 3;\n    return var_rax_1;\n");
}

#[test]
fn join_after_if_else_reads_the_first_visited_arm() {
    // if (ecx == 0) eax = 2; else eax = 1; return eax;
    let code = vec![
        insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
        insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(4)]),
        insn(2, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
        insn(3, Mnemonic::Goto, vec![Operand::target(5)]),
        insn(4, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(2)]),
        insn(5, Mnemonic::Return, vec![Operand::reg("eax")]),
    ];

    let lifted = Lifter::new(&x64()).lift(&run(), &code);
    let text = lifted.to_text();

    // the taken arm is promoted first, so its write is the one the join reads
    assert!(text.contains("return 2;"), "{text}");
    assert!(text.contains("var_rax_1 = 1;"), "{text}");
    let inlined: Vec<_> = lifted
        .events
        .filter_kind(EventKind::VariableInlined)
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(inlined, vec!["var_rax"]);
}

#[test]
fn scenario_b_compare_merges_into_conditional() {
    // 0 cmp ecx, edx; 1 jge 3; 2 goto 4; 3 mov eax, 1; 4 ret eax
    let code = vec![
        insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::reg("edx")]),
        insn(1, Mnemonic::JumpIfGreaterOrEqual, vec![Operand::target(3)]),
        insn(2, Mnemonic::Goto, vec![Operand::target(4)]),
        insn(3, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
        insn(4, Mnemonic::Return, vec![Operand::reg("eax")]),
    ];
    let image = x64();
    let lifted = Lifter::with_options(&image, LiftOptions::minimal()).lift(&run(), &code);

    let entry: Vec<_> = lifted.blocks[0].live_statements().collect();
    assert_eq!(entry.len(), 1);
    assert_eq!(entry[0].source, Some(1));
    match &entry[0].expr {
        Expr::If {
            condition,
            body: IfBody::Goto(3),
        } => assert!(matches!(
            **condition,
            Expr::Compare {
                kind: CompareKind::GreaterOrEqual,
                ..
            }
        )),
        other => panic!("expected conditional goto, got {other:?}"),
    }
    assert!(!lifted.events.has(EventKind::UnresolvedCompare));
}

#[test]
fn scenario_c_absorbs_single_predecessor_target() {
    let image = x64();
    let lifted = Lifter::new(&image).lift(&run(), &scenario_c());

    let states: Vec<_> = lifted.blocks.iter().map(|b| (b.start, b.state)).collect();
    assert_eq!(
        states,
        vec![
            (0, StructureState::Retained),
            (2, StructureState::Retained),
            (4, StructureState::Absorbed),
        ]
    );
    let visible: Vec<_> = lifted.visible_blocks().map(|b| b.start).collect();
    assert_eq!(visible, vec![0, 2]);

    assert_eq!(
        lifted.to_text(),
        "    if (var_rcx == 0)\n    {\n        var_rax = 2;\n        goto ISIL_2;\n    }\nISIL_2:\n    return 1;\n"
    );
}

#[test]
fn absorbed_blocks_had_a_single_predecessor() {
    // a loop whose exit is shared by two paths, and a diamond
    let code = vec![
        insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
        insn(1, Mnemonic::JumpIfLess, vec![Operand::target(6)]),
        insn(2, Mnemonic::Subtract, vec![Operand::reg("ecx"), Operand::imm(1)]),
        insn(3, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(10)]),
        insn(4, Mnemonic::JumpIfGreater, vec![Operand::target(0)]),
        insn(5, Mnemonic::Goto, vec![Operand::target(8)]),
        insn(6, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
        insn(7, Mnemonic::Goto, vec![Operand::target(8)]),
        insn(8, Mnemonic::Return, vec![Operand::reg("eax")]),
    ];
    let image = x64();
    let lifted = Lifter::new(&image).lift(&run(), &code);
    assert!(!lifted.is_fault());

    let mut absorbed = 0;
    for block in &lifted.blocks {
        if block.state == StructureState::Absorbed {
            absorbed += 1;
            assert_eq!(block.predecessors.len(), 1, "block at {}", block.start);
            assert!(block.ignore);
        } else {
            assert_eq!(block.state, StructureState::Retained);
        }
    }
    assert!(absorbed > 0);
}

#[test]
fn promotion_does_not_leak_between_siblings() {
    // B1: 0 cmp; 1 je 4    B2: 2 mov eax, 1; 3 ret eax    B3: 4 ret eax
    let code = vec![
        insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
        insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(4)]),
        insn(2, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
        insn(3, Mnemonic::Return, vec![Operand::reg("eax")]),
        insn(4, Mnemonic::Return, vec![Operand::reg("eax")]),
    ];
    let image = x64();
    let lifted = Lifter::with_options(&image, LiftOptions::minimal()).lift(&run(), &code);

    let written = match &lifted.blocks[1].statements[0].expr {
        Expr::Assign { target, .. } => target.as_variable(),
        other => panic!("expected assignment, got {other:?}"),
    };
    let read = match &lifted.blocks[2].statements[0].expr {
        Expr::Return(Some(value)) => value.as_variable(),
        other => panic!("expected return, got {other:?}"),
    };
    assert!(written.is_some() && read.is_some());
    assert_ne!(written, read);
}

#[test]
fn dataflow_settles_and_keeps_types() {
    // walks a linked list: do { rcx = rcx->next } while (rcx != 0)
    let node = TypeDef::new(TypeId(1), "Game", "Node").with_field("next", 0x10, TypeRef::Class(TypeId(1)));
    let image = ProgramImage::builder(InstructionSet::X86_64).type_def(node).build();
    let method = MethodDef::new(MethodId(2), "Last", "Node").instance_of(TypeId(1));
    let code = vec![
        insn(0, Mnemonic::Move, vec![Operand::reg("rcx"), Operand::Memory(MemoryOperand::base_addend("rcx", 0x10))]),
        insn(1, Mnemonic::Compare, vec![Operand::reg("rcx"), Operand::imm(0)]),
        insn(2, Mnemonic::JumpIfNotEqual, vec![Operand::target(0)]),
        insn(3, Mnemonic::Return, vec![]),
    ];

    let lifted = Lifter::new(&image).lift(&method, &code);
    assert!(!lifted.is_fault());
    assert!(!lifted.events.has(EventKind::IterationLimit));
    assert!(lifted.events.has(EventKind::FieldResolved));

    let typed = lifted
        .variables
        .iter()
        .filter(|(_, v)| v.ty == Some(TypeRef::Class(TypeId(1))))
        .count();
    assert_eq!(typed, 2);
    assert!(lifted.to_text().contains("var_rcx = this.next;"));

    // a single round already sets the types; later rounds never clear them
    let capped = LiftOptions {
        max_fixpoint_iterations: 1,
        ..LiftOptions::default()
    };
    let once = Lifter::with_options(&image, capped).lift(&method, &code);
    for ((_, early), (_, settled)) in once.variables.iter().zip(lifted.variables.iter()) {
        if early.ty.is_some() {
            assert_eq!(early.ty, settled.ty);
        }
    }
}

#[test]
fn strings_and_metadata_become_literals() {
    let image = ProgramImage::builder(InstructionSet::X86_64)
        .segment(0x4000, b"Player spawned\0".to_vec())
        .global(
            0x9000,
            MetadataUsage::Type {
                name: "Game.Player".to_string(),
                definition: None,
            },
        )
        .build();
    let log = Arc::new(
        MethodDef::new(MethodId(9), "Log", "Debug")
            .with_parameter("message", TypeRef::String)
            .with_parameter("type", TypeRef::Object),
    );
    let code = vec![
        insn(0, Mnemonic::Move, vec![Operand::reg("rcx"), Operand::Memory(MemoryOperand::absolute(0x4000))]),
        insn(1, Mnemonic::Move, vec![Operand::reg("rdx"), Operand::Memory(MemoryOperand::absolute(0x9000))]),
        insn(2, Mnemonic::Call, vec![Operand::Method(log)]),
        insn(3, Mnemonic::Return, vec![]),
    ];

    let lifted = Lifter::new(&image).lift(&run(), &code);
    assert_eq!(
        lifted.to_text(),
        "    Debug.Log(\"Player spawned\", typeof(Game.Player));\n    return;\n"
    );
    assert!(lifted.events.has(EventKind::StringInlined));
    assert!(lifted.events.has(EventKind::MetadataInlined));
}

#[test]
fn stores_to_slots_and_strings_keep_their_deref() {
    let image = ProgramImage::builder(InstructionSet::X86_64)
        .segment(0x4000, b"hello\0".to_vec())
        .global(
            0x9000,
            MetadataUsage::Type {
                name: "Game.Player".to_string(),
                definition: None,
            },
        )
        .build();
    let code = vec![
        insn(0, Mnemonic::Move, vec![Operand::Memory(MemoryOperand::absolute(0x9000)), Operand::reg("ecx")]),
        insn(1, Mnemonic::Move, vec![Operand::Memory(MemoryOperand::absolute(0x4000)), Operand::reg("edx")]),
        insn(2, Mnemonic::Return, vec![]),
    ];

    let lifted = Lifter::new(&image).lift(&run(), &code);
    assert_eq!(
        lifted.to_text(),
        "    *(typeof(Game.Player)) = var_rcx;\n    *(16384) = var_rdx;\n    return;\n"
    );
    assert!(lifted.events.has(EventKind::MetadataInlined));
    assert!(!lifted.events.has(EventKind::StringInlined));

    let block = &lifted.blocks[0];
    for statement in block.statements.iter().filter(|s| !s.eliminated).take(2) {
        assert!(matches!(
            &statement.expr,
            Expr::Assign { target, .. } if matches!(target.as_ref(), Expr::Deref(_))
        ));
    }
}

#[test]
fn arm64_entry_registers_and_return_banks() {
    let image = ProgramImage::builder(InstructionSet::Arm64).build();

    // this in X0, f in V0, n in X1; a float result comes back in V0
    let scale = MethodDef::new(MethodId(20), "Scale", "Ship")
        .instance_of(TypeId(4))
        .with_parameter("f", TypeRef::R4)
        .with_parameter("n", TypeRef::I4)
        .returning(TypeRef::R4);
    let code = vec![
        insn(0, Mnemonic::Move, vec![Operand::reg("w2"), Operand::reg("w1")]),
        insn(1, Mnemonic::Move, vec![Operand::reg("x3"), Operand::reg("x0")]),
        insn(2, Mnemonic::Return, vec![]),
    ];
    let lifted = Lifter::new(&image).lift(&scale, &code);
    assert_eq!(
        lifted.to_text(),
        "    var_X2 = n;\n    var_X3 = this;\n    return f;\n"
    );

    // an integer result comes back in X0, which starts out holding n
    let twice = MethodDef::new(MethodId(21), "Twice", "Ship")
        .with_parameter("n", TypeRef::I4)
        .returning(TypeRef::I4);
    let code = vec![
        insn(0, Mnemonic::Add, vec![Operand::reg("w0"), Operand::reg("w0"), Operand::reg("w0")]),
        insn(1, Mnemonic::Return, vec![]),
    ];
    let lifted = Lifter::new(&image).lift(&twice, &code);
    assert_eq!(lifted.to_text(), "    var_X0 = n + n;\n    return var_X0;\n");
}

#[test]
fn unsupported_instructions_stay_visible() {
    let code = vec![
        insn(0, Mnemonic::Push, vec![Operand::reg("rbp")]),
        insn(1, Mnemonic::Return, vec![]),
    ];
    let image = x64();
    let lifted = Lifter::new(&image).lift(&run(), &code);

    assert_eq!(lifted.to_text(), "    /* Push rbp */\n    return;\n");
    assert_eq!(lifted.events.count_kind(EventKind::UnsupportedInstruction), 1);
}

#[test]
fn faults_are_contained_per_method() {
    let image = x64();
    let good = Arc::new(run());
    let bad = Arc::new(MethodDef::new(MethodId(2), "Broken", "Test"));
    let bodies = vec![
        MethodBody::new(good, scenario_a()),
        MethodBody::new(bad, vec![insn(0, Mnemonic::JumpIfEqual, vec![Operand::target(40)])]),
        MethodBody::new(Arc::new(MethodDef::new(MethodId(3), "Empty", "Test")), vec![]),
    ];

    let lifted = Lifter::new(&image).lift_all(&bodies);
    assert_eq!(lifted.len(), 3);
    assert!(!lifted[0].is_fault());
    assert_eq!(lifted[0].method, MethodId(1));
    assert!(lifted[1].is_fault());
    assert!(lifted[1].to_text().contains("lifting failed"));
    assert!(lifted[2].is_fault());
    let faults: Vec<_> = lifted.iter().filter_map(|m| m.fault()).collect();
    assert_eq!(faults.len(), 2);
    assert!(matches!(&faults[1], Error::LiftFault { method, .. } if method.contains("Empty")));
    assert!(matches!(
        lifted[1].blocks[0].statements[0].expr,
        Expr::Comment(_)
    ));
}

#[test]
fn cache_reuses_lifted_methods() {
    let image = x64();
    let lifter = Lifter::new(&image);
    let cache = LiftCache::new();
    let method = run();

    let first = cache.get_or_lift(&lifter, &method, &scenario_a());
    let again = cache.get_or_lift(&lifter, &method, &scenario_a());
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(cache.len(), 1);

    assert!(cache.invalidate(method.id));
    assert!(cache.is_empty());
}

#[test]
fn unresolved_call_degrades_to_pointer_call() {
    let code = vec![
        insn(0, Mnemonic::Call, vec![Operand::imm(0x1800_2000)]),
        insn(1, Mnemonic::Return, vec![]),
    ];
    let image = x64();
    let lifted = Lifter::with_options(&image, LiftOptions::minimal()).lift(&run(), &code);

    assert!(lifted.events.has(EventKind::UnresolvedCall));
    let pointer_call = lifted.blocks[0].live_statements().any(|s| {
        s.expr
            .any(|e| matches!(e.as_value(), Some(Value::UnmanagedFunction(0x1800_2000))))
    });
    assert!(pointer_call);
}
