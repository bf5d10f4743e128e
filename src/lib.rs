// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # isilift
//!
//! Lifts the architecture-independent instruction stream (ISIL) of IL2CPP-compiled methods
//! into structured, colorized pseudo-C#. The input is a linear list of ISIL instructions,
//! already decoded from x86-64 or ARM64 machine code, plus read-only access to the
//! program's address space and metadata. The output is a short list of blocks whose
//! statements use named variables, field accesses, metadata and string literals, and
//! structured `if` bodies.
//!
//! ## Features
//!
//! - **Register promotion** - Registers become variables, with `this` and parameters bound at entry
//! - **Type recovery** - Variable types flow from parameters, calls and field accesses
//! - **Field recovery** - `*(obj + 0x18)` becomes `obj.field` when the layout is known
//! - **Literal recovery** - Metadata usage slots and string pointers become readable literals
//! - **Inlining and folding** - Single-use temporaries disappear and constant arithmetic folds
//! - **Branch structuring** - Single-predecessor branch targets become `if` bodies
//! - **Fault containment** - A method that cannot be lifted renders as a comment, never a panic
//! - **Parallel batches** - Many methods lift concurrently with `rayon`
//!
//! ## Quick Start
//!
//! ```rust
//! use isilift::prelude::*;
//!
//! let image = ProgramImage::builder(InstructionSet::X86_64)
//!     .segment(0x2000, b"Hello\0".to_vec())
//!     .build();
//! let method = MethodDef::new(MethodId(1), "Greeting", "Demo").returning(TypeRef::String);
//! let code = vec![
//!     Instruction::new(0, Mnemonic::Move, vec![Operand::reg("rax"), Operand::Memory(MemoryOperand::absolute(0x2000))]),
//!     Instruction::new(1, Mnemonic::Return, vec![Operand::reg("rax")]),
//! ];
//!
//! let lifted = Lifter::with_options(&image, LiftOptions::full()).lift(&method, &code);
//! assert_eq!(lifted.to_text(), "    return \"Hello\";\n");
//! ```
//!
//! ## Architecture
//!
//! - [`isil`] - The consumed instruction model
//! - [`program`] - The consumed program model and the [`program::Program`] accessor trait
//! - [`lifter`] - The pipeline, its IR, passes and text emission
//!
//! ## Error Handling
//!
//! Fallible APIs return [`Result`]. Most degradations are not errors: unsupported
//! instructions become placeholders, unresolvable calls become function-pointer calls,
//! and both are recorded in the lifted method's [`lifter::EventLog`]. Errors that abort
//! the lift of a method are contained by [`Lifter::lift`].
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and installs no logger. Lossy recoveries are
//! logged at `warn`, per-method summaries at `debug`.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use isilift::prelude::*;
///
/// let image = ProgramImage::builder(InstructionSet::Arm64).build();
/// let lifter = Lifter::new(&image);
/// assert!(lifter.options().enabled(LiftPasses::INLINE));
/// ```
pub mod prelude;

pub mod isil;
pub mod lifter;
pub mod program;

pub use error::{Error, Result};

/// Pipeline driver; see [`lifter::Lifter`].
pub use lifter::{LiftOptions, LiftedMethod, Lifter};
