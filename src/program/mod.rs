//! The analysed program as seen by the lifter.
//!
//! Lifting never parses a binary itself. Everything it needs to know about the program
//! (the instruction-set family, the loaded address space, global metadata usages, method
//! and key-function addresses, and type layouts) is reached through the [`Program`] trait.
//! Implementations are shared read-only between concurrent lifts, so the trait requires
//! `Send + Sync`.
//!
//! # Key Components
//!
//! - [`Program`] - Address-space and metadata accessor consumed by the pipeline
//! - [`ProgramImage`] - In-memory implementation assembled with a builder
//! - [`KeyFunction`] - Well-known runtime helpers
//! - [`TypeDef`], [`MethodDef`], [`FieldDef`], [`TypeRef`] - Definitions the passes consult
//! - [`MetadataUsage`] - Resolved globals substituted for raw addresses
//!
//! # Examples
//!
//! ```rust
//! use isilift::{isil::InstructionSet, program::{Program, ProgramImage}};
//!
//! let image = ProgramImage::builder(InstructionSet::X86_64)
//!     .segment(0x2000, b"hello\0".to_vec())
//!     .build();
//!
//! assert_eq!(image.string_literal_at(0x2000).as_deref(), Some("hello"));
//! assert_eq!(image.string_literal_at(0x3000), None);
//! ```

mod image;
mod keyfn;
mod model;

pub use image::{ProgramImage, ProgramImageBuilder};
pub use keyfn::KeyFunction;
pub use model::{
    FieldDef, FieldId, MetadataUsage, MethodDef, MethodId, Parameter, TypeDef, TypeId, TypeRef,
};

use std::{collections::HashSet, sync::Arc};

use crate::isil::InstructionSet;

/// Longest C string the default decoder accepts.
pub const MAX_STRING_LITERAL: usize = 4096;

/// Read-only access to the analysed program's address space and metadata.
///
/// Only the required methods touch implementation state; pointer reads, string
/// decoding and field lookup have default implementations expressed in terms of them.
pub trait Program: Send + Sync {
    /// Instruction-set family of the compiled code, selecting register and calling
    /// convention rules.
    fn instruction_set(&self) -> InstructionSet;

    /// Returns the mapped bytes from `address` to the end of its segment.
    fn bytes_at(&self, address: u64) -> Option<&[u8]>;

    /// Resolves a global metadata usage slot at `address`.
    fn global_at(&self, address: u64) -> Option<MetadataUsage>;

    /// Resolves the managed method whose body starts at `address`.
    fn method_at(&self, address: u64) -> Option<Arc<MethodDef>>;

    /// Resolves a runtime helper at `address`.
    fn key_function_at(&self, address: u64) -> Option<KeyFunction>;

    /// Returns the definition of a type.
    fn type_def(&self, id: TypeId) -> Option<&TypeDef>;

    /// Reads a little-endian pointer stored at `address`.
    fn read_pointer(&self, address: u64) -> Option<u64> {
        let bytes = self.bytes_at(address)?.get(..8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Decodes a printable, NUL-terminated string at `address`.
    ///
    /// Returns `None` unless the bytes form a non-empty UTF-8 string of printable
    /// characters (tabs and line breaks allowed) terminated before
    /// [`MAX_STRING_LITERAL`] bytes.
    fn string_literal_at(&self, address: u64) -> Option<String> {
        decode_c_string(self.bytes_at(address)?)
    }

    /// Returns the instance field at byte `offset` within values of `ty`.
    ///
    /// The type's own fields are searched first, then each base type in turn.
    fn field_at_offset(&self, ty: &TypeRef, offset: i64) -> Option<Arc<FieldDef>> {
        let mut current = ty.definition();
        let mut seen = HashSet::new();

        while let Some(id) = current {
            if !seen.insert(id) {
                return None;
            }

            let def = self.type_def(id)?;
            if let Some(field) = def.instance_field_at(offset) {
                return Some(field.clone());
            }
            current = def.base;
        }

        None
    }
}

/// Decodes a printable NUL-terminated UTF-8 string from the start of `bytes`.
#[must_use]
pub fn decode_c_string(bytes: &[u8]) -> Option<String> {
    let limit = bytes.len().min(MAX_STRING_LITERAL);
    let end = bytes[..limit].iter().position(|&b| b == 0)?;
    if end == 0 {
        return None;
    }

    let text = std::str::from_utf8(&bytes[..end]).ok()?;
    if text
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
    {
        Some(text.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_c_string() {
        assert_eq!(decode_c_string(b"abc\0def").as_deref(), Some("abc"));
        assert_eq!(decode_c_string(b"line\n\0").as_deref(), Some("line\n"));
        assert_eq!(decode_c_string(b"\0"), None);
        assert_eq!(decode_c_string(b"no terminator"), None);
        assert_eq!(decode_c_string(b"\x01\x02\0"), None);
        assert_eq!(decode_c_string(b"\xff\xfe\0"), None);
    }

    #[test]
    fn test_field_at_offset_walks_base_chain() {
        let image = ProgramImage::builder(InstructionSet::X86_64)
            .type_def(TypeDef::new(TypeId(1), "", "Base").with_field("health", 0x10, TypeRef::I4))
            .type_def(
                TypeDef::new(TypeId(2), "", "Player")
                    .with_base(TypeId(1))
                    .with_field("name", 0x18, TypeRef::String),
            )
            .build();

        let player = TypeRef::Class(TypeId(2));
        let own = image.field_at_offset(&player, 0x18).unwrap();
        assert_eq!(own.name, "name");

        let inherited = image.field_at_offset(&player, 0x10).unwrap();
        assert_eq!(inherited.name, "health");
        assert_eq!(inherited.declaring_type, TypeId(1));

        assert!(image.field_at_offset(&player, 0x20).is_none());
        assert!(image.field_at_offset(&TypeRef::I4, 0x10).is_none());
    }

    #[test]
    fn test_field_at_offset_survives_base_cycle() {
        let image = ProgramImage::builder(InstructionSet::X86_64)
            .type_def(TypeDef::new(TypeId(1), "", "A").with_base(TypeId(2)))
            .type_def(TypeDef::new(TypeId(2), "", "B").with_base(TypeId(1)))
            .build();

        assert!(image.field_at_offset(&TypeRef::Class(TypeId(1)), 8).is_none());
    }

    #[test]
    fn test_read_pointer() {
        let image = ProgramImage::builder(InstructionSet::Arm64)
            .segment(0x100, 0x1234_5678u64.to_le_bytes().to_vec())
            .build();

        assert_eq!(image.read_pointer(0x100), Some(0x1234_5678));
        assert_eq!(image.read_pointer(0x104), None);
    }
}
