//! Lifting ISIL instruction streams to structured pseudo-source.
//!
//! This module turns the linear instruction list of one method into a small graph of
//! blocks whose statements read like C#: registers become named variables, field offsets
//! become member accesses, metadata and string addresses become literals, single-use
//! temporaries are inlined and simple branches become `if` bodies.
//!
//! # Architecture
//!
//! - [`canonical`] - Register alias canonicalization per instruction-set family
//! - [`cfg`] - Basic block partitioning and edge construction
//! - [`transform`] - Per-instruction mapping to IR statements
//! - [`ir`] - Values, expressions, blocks and variables
//! - [`passes`] - Promotion, data flow, inlining, folding, structuring, labels
//! - [`emit`] - Tagged text output
//! - [`cache`] - Lifted results keyed by method identity
//!
//! # Key Components
//!
//! - [`Lifter`] - Pipeline driver; [`Lifter::lift`] never fails
//! - [`LiftedMethod`] - Blocks, variables and events of one method
//! - [`LiftOptions`] - Pass selection and iteration bounds
//! - [`EventLog`] - Per-lift record of rewrites and degradations
//! - [`Output`] / [`TextBuffer`] - Sinks for colorized text
//!
//! # Examples
//!
//! ```rust
//! use isilift::{
//!     isil::{Instruction, InstructionSet, Mnemonic, Operand},
//!     lifter::{EventKind, LiftOptions, Lifter, TextBuffer, TextKind},
//!     program::{MethodDef, MethodId, ProgramImage},
//! };
//!
//! let image = ProgramImage::builder(InstructionSet::X86_64).build();
//! let method = MethodDef::new(MethodId(1), "Run", "Demo");
//! let code = vec![
//!     Instruction::new(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]),
//!     Instruction::new(1, Mnemonic::Add, vec![Operand::reg("eax"), Operand::reg("eax"), Operand::imm(3)]),
//!     Instruction::new(2, Mnemonic::Return, vec![Operand::reg("eax")]),
//! ];
//!
//! let lifted = Lifter::with_options(&image, LiftOptions::full()).lift(&method, &code);
//! assert!(lifted.events.has(EventKind::ConstantFolded));
//!
//! let mut out = TextBuffer::new();
//! lifted.write(&mut out);
//! assert_eq!(out.text(), "    return 8;\n");
//! assert!(out.spans().iter().any(|s| s.kind == TextKind::Keyword));
//! ```

pub mod cache;
pub mod canonical;
pub mod cfg;
pub mod convention;
pub mod emit;
pub mod events;
pub mod ir;
pub mod lift;
pub mod options;
pub mod passes;
pub mod transform;

pub use cache::LiftCache;
pub use canonical::{canonical_register, stack_pointer};
pub use cfg::CfgBuilder;
pub use convention::CallingConvention;
pub use emit::{write_listing, Output, Span, TextBuffer, TextKind, Writer};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use ir::{Block, BlockKind, Expr, Value};
pub use lift::{LiftedMethod, Lifter, MethodBody};
pub use options::{LiftOptions, LiftPasses};
pub use transform::Transformer;
