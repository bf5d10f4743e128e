//! Well-known IL2CPP runtime entry points.
//!
//! Compiled IL2CPP code calls a handful of runtime helpers for allocation, class
//! initialization, boxing and exception raising. The decoder resolves these by address or
//! by exported symbol; the lifter renders them by name and uses the fixed table below to
//! decide whether a call produces a value and how many arguments it consumes.

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// A runtime-support function recognised by address or symbol name.
///
/// The string form of each variant is the runtime's exported symbol name, so
/// [`std::str::FromStr`] resolves decoder symbols directly.
///
/// # Examples
///
/// ```rust
/// use isilift::program::KeyFunction;
///
/// let f: KeyFunction = "il2cpp_value_box".parse().unwrap();
/// assert_eq!(f, KeyFunction::ValueBox);
/// assert_eq!(f.argument_count(), 2);
/// assert!(f.returns_value());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumCount, IntoStaticStr,
)]
pub enum KeyFunction {
    /// Lazily initializes a method's metadata usages
    #[strum(serialize = "il2cpp_codegen_initialize_method")]
    CodegenInitializeMethod,
    /// Runs a class's static constructor if it has not run yet
    #[strum(serialize = "il2cpp_runtime_class_init")]
    RuntimeClassInit,
    /// Allocates an object of a class
    #[strum(serialize = "il2cpp_object_new")]
    ObjectNew,
    /// Allocates a single-dimensional array
    #[strum(serialize = "il2cpp_array_new_specific")]
    ArrayNewSpecific,
    /// Returns the `System.Type` for a type handle
    #[strum(serialize = "il2cpp_type_get_object")]
    TypeGetObject,
    /// Resolves an internal call by name
    #[strum(serialize = "il2cpp_resolve_icall")]
    ResolveIcall,
    /// Creates a managed string from a C string
    #[strum(serialize = "il2cpp_string_new")]
    StringNew,
    /// Boxes a value type
    #[strum(serialize = "il2cpp_value_box")]
    ValueBox,
    /// Unboxes an object
    #[strum(serialize = "il2cpp_object_unbox")]
    ObjectUnbox,
    /// Throws a managed exception; never returns
    #[strum(serialize = "il2cpp_raise_exception")]
    RaiseException,
    /// Runtime `isinst` check
    #[strum(serialize = "il2cpp_vm_object_is_inst")]
    VmObjectIsInst,
    /// Looks up a P/Invoke target address
    #[strum(serialize = "il2cpp_pinvoke_lookup")]
    AddrPInvokeLookup,
}

impl KeyFunction {
    /// Returns `true` when a call leaves a value in the return register.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !matches!(
            self,
            KeyFunction::CodegenInitializeMethod | KeyFunction::RuntimeClassInit
        )
    }

    /// Returns `true` for helpers that transfer control away like a jump and never
    /// come back to the caller.
    #[must_use]
    pub fn is_jump_like(&self) -> bool {
        matches!(self, KeyFunction::RaiseException)
    }

    /// Number of register-passed arguments the helper consumes.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        match self {
            KeyFunction::ValueBox => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_symbol_names_round_trip() {
        for function in KeyFunction::iter() {
            let name = function.to_string();
            assert!(name.starts_with("il2cpp_"), "{name}");
            assert_eq!(name.parse::<KeyFunction>().ok(), Some(function));
        }
        assert_eq!(KeyFunction::iter().count(), KeyFunction::COUNT);
    }

    #[test]
    fn test_behaviour_table() {
        assert!(!KeyFunction::RuntimeClassInit.returns_value());
        assert!(!KeyFunction::CodegenInitializeMethod.returns_value());
        assert!(KeyFunction::ObjectNew.returns_value());
        assert!(KeyFunction::RaiseException.is_jump_like());
        assert!(!KeyFunction::ObjectNew.is_jump_like());
        assert_eq!(KeyFunction::StringNew.argument_count(), 1);
        assert!("GetComponent".parse::<KeyFunction>().is_err());
    }
}
