//! Register calling conventions of the supported platforms.
//!
//! IL2CPP compiles managed methods to native functions that take `this` (for instance
//! methods) followed by the declared parameters and a trailing hidden `MethodInfo*`.
//! Only the register-passed prefix is modelled; stack arguments are not bound.

use crate::{isil::InstructionSet, program::TypeRef};

/// Register banks used to pass arguments and return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallingConvention {
    /// Integer/pointer argument registers in order
    pub integer: &'static [&'static str],
    /// Floating-point argument registers in order
    pub float: &'static [&'static str],
    /// `true` when both banks advance together by argument position (Microsoft x64);
    /// otherwise each bank counts its own arguments (AAPCS64)
    pub positional: bool,
    /// Integer return register
    pub integer_return: &'static str,
    /// Floating-point return register
    pub float_return: &'static str,
}

const X64: CallingConvention = CallingConvention {
    integer: &["rcx", "rdx", "r8", "r9"],
    float: &["xmm0", "xmm1", "xmm2", "xmm3"],
    positional: true,
    integer_return: "rax",
    float_return: "xmm0",
};

const ARM64: CallingConvention = CallingConvention {
    integer: &["X0", "X1", "X2", "X3", "X4", "X5", "X6", "X7"],
    float: &["V0", "V1", "V2", "V3", "V4", "V5", "V6", "V7"],
    positional: false,
    integer_return: "X0",
    float_return: "V0",
};

impl CallingConvention {
    /// Returns the convention of an instruction-set family.
    #[must_use]
    pub fn of(isa: InstructionSet) -> &'static CallingConvention {
        match isa {
            InstructionSet::X86_64 => &X64,
            InstructionSet::Arm64 => &ARM64,
        }
    }

    /// Assigns argument registers to a sequence of argument types.
    ///
    /// `this` is passed as the first integer argument and should be included by the
    /// caller as a non-float entry. Arguments beyond the register banks get `None`.
    #[must_use]
    pub fn assign<'t>(&self, arguments: impl IntoIterator<Item = &'t TypeRef>) -> Vec<Option<&'static str>> {
        let mut next_int = 0;
        let mut next_float = 0;

        arguments
            .into_iter()
            .enumerate()
            .map(|(position, ty)| {
                if self.positional {
                    let bank = if ty.is_float() { self.float } else { self.integer };
                    return bank.get(position).copied();
                }

                if ty.is_float() {
                    next_float += 1;
                    self.float.get(next_float - 1).copied()
                } else {
                    next_int += 1;
                    self.integer.get(next_int - 1).copied()
                }
            })
            .collect()
    }

    /// Returns the register holding a returned value of type `ty`.
    #[must_use]
    pub fn return_register(&self, ty: &TypeRef) -> &'static str {
        if ty.is_float() {
            self.float_return
        } else {
            self.integer_return
        }
    }
}
