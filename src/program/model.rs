//! Type, method and field definitions of the analysed program.
//!
//! These types mirror the subset of IL2CPP metadata the lifter consults: declaring types
//! with their instance field layout, methods with their signatures, and the resolved
//! metadata usages that code embeds as raw addresses. All definitions are immutable once
//! built and are shared behind [`std::sync::Arc`] so lifted output can reference them
//! without copying.

use std::{fmt, sync::Arc};

/// Identity of a type definition within a [`crate::program::Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Identity of a method definition, used as the key for cached lifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

/// Identity of a field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// A reference to a type as it appears in a signature or field declaration.
///
/// Primitive element types are spelled out; everything else points at a
/// [`TypeDef`] by [`TypeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// `nint`
    IntPtr,
    /// `nuint`
    UIntPtr,
    /// A reference type defined in the program
    Class(TypeId),
    /// A value type defined in the program
    ValueType(TypeId),
    /// An instantiation of a generic type definition
    GenericInst(TypeId),
    /// A single-dimensional zero-based array
    SzArray(Box<TypeRef>),
    /// An unmanaged pointer
    Pointer(Box<TypeRef>),
    /// An unbound generic parameter, by name
    GenericParam(String),
}

impl TypeRef {
    /// Returns `true` for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// Returns `true` for the floating-point primitives, which travel in the
    /// floating-point register bank.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, TypeRef::R4 | TypeRef::R8)
    }

    /// Returns the type definition whose field layout describes values of this type.
    ///
    /// Pointers resolve to their pointee; primitives, arrays and generic parameters
    /// have no definition the lifter can look fields up in.
    #[must_use]
    pub fn definition(&self) -> Option<TypeId> {
        match self {
            TypeRef::Class(id) | TypeRef::ValueType(id) | TypeRef::GenericInst(id) => Some(*id),
            TypeRef::Pointer(inner) => inner.definition(),
            _ => None,
        }
    }

    /// Returns the C# keyword for primitive types.
    #[must_use]
    pub fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            TypeRef::Void => "void",
            TypeRef::Boolean => "bool",
            TypeRef::Char => "char",
            TypeRef::I1 => "sbyte",
            TypeRef::U1 => "byte",
            TypeRef::I2 => "short",
            TypeRef::U2 => "ushort",
            TypeRef::I4 => "int",
            TypeRef::U4 => "uint",
            TypeRef::I8 => "long",
            TypeRef::U8 => "ulong",
            TypeRef::R4 => "float",
            TypeRef::R8 => "double",
            TypeRef::String => "string",
            TypeRef::Object => "object",
            TypeRef::IntPtr => "nint",
            TypeRef::UIntPtr => "nuint",
            _ => return None,
        })
    }
}

/// A type definition with its instance field layout.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Identity of this type
    pub id: TypeId,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Base type, walked when a field offset is not found on this type
    pub base: Option<TypeId>,
    /// Declared fields, static and instance
    pub fields: Vec<Arc<FieldDef>>,
}

impl TypeDef {
    /// Creates a type without fields or base type.
    pub fn new(id: TypeId, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDef {
            id,
            namespace: namespace.into(),
            name: name.into(),
            base: None,
            fields: Vec::new(),
        }
    }

    /// Sets the base type.
    #[must_use]
    pub fn with_base(mut self, base: TypeId) -> Self {
        self.base = Some(base);
        self
    }

    /// Adds an instance field at `offset`.
    ///
    /// Field identities are derived from the type identity and declaration order.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, offset: i64, field_type: TypeRef) -> Self {
        let id = FieldId((self.id.0 << 16) | self.fields.len() as u32);
        self.fields.push(Arc::new(FieldDef {
            id,
            name: name.into(),
            offset,
            field_type,
            declaring_type: self.id,
            declaring_type_name: self.name.clone(),
            is_static: false,
        }));
        self
    }

    /// Returns `Namespace.Name`, or just the name in the global namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns the instance field declared directly on this type at `offset`.
    #[must_use]
    pub fn instance_field_at(&self, offset: i64) -> Option<&Arc<FieldDef>> {
        self.fields
            .iter()
            .find(|field| !field.is_static && field.offset == offset)
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDef {
    /// Identity of this field
    pub id: FieldId,
    /// Field name
    pub name: String,
    /// Byte offset of the field within an instance
    pub offset: i64,
    /// Declared type of the field
    pub field_type: TypeRef,
    /// Type declaring the field
    pub declaring_type: TypeId,
    /// Simple name of the declaring type, kept for rendering
    pub declaring_type_name: String,
    /// Static fields never match instance offset lookups
    pub is_static: bool,
}

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// Parameter name as declared
    pub name: String,
    /// Declared parameter type
    pub param_type: TypeRef,
}

/// A method definition and the signature details the lifter needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDef {
    /// Identity of this method
    pub id: MethodId,
    /// Method name
    pub name: String,
    /// Declaring type, if known
    pub declaring_type: Option<TypeId>,
    /// Simple name of the declaring type, kept for rendering
    pub declaring_type_name: String,
    /// `true` for static methods, which take no `this` argument
    pub is_static: bool,
    /// Declared parameters in order, excluding `this`
    pub parameters: Vec<Parameter>,
    /// Declared return type
    pub return_type: TypeRef,
    /// Entry point of the compiled body, if any
    pub address: Option<u64>,
}

impl MethodDef {
    /// Creates a static, parameterless `void` method declared by `declaring_type_name`.
    pub fn new(id: MethodId, name: impl Into<String>, declaring_type_name: impl Into<String>) -> Self {
        MethodDef {
            id,
            name: name.into(),
            declaring_type: None,
            declaring_type_name: declaring_type_name.into(),
            is_static: true,
            parameters: Vec::new(),
            return_type: TypeRef::Void,
            address: None,
        }
    }

    /// Marks the method as an instance method of `declaring_type`.
    #[must_use]
    pub fn instance_of(mut self, declaring_type: TypeId) -> Self {
        self.declaring_type = Some(declaring_type);
        self.is_static = false;
        self
    }

    /// Appends a declared parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, param_type: TypeRef) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            param_type,
        });
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returning(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }

    /// Sets the entry point address.
    #[must_use]
    pub fn at(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    /// Returns `true` when a call to this method leaves a value in the return register.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// Returns the type of `this` for instance methods.
    #[must_use]
    pub fn this_type(&self) -> Option<TypeRef> {
        if self.is_static {
            return None;
        }
        self.declaring_type.map(TypeRef::Class)
    }
}

impl fmt::Display for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type_name, self.name)
    }
}

/// A global metadata usage recovered from an address embedded in code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataUsage {
    /// A type or type-info slot
    Type {
        /// Display name of the type
        name: String,
        /// Definition, when the type is defined in the program
        definition: Option<TypeId>,
    },
    /// A method definition slot
    MethodDef(Arc<MethodDef>),
    /// A method reference slot (generic instantiation), by display name
    MethodRef(String),
    /// A field reference slot
    FieldRef(Arc<FieldDef>),
    /// A string literal slot
    StringLiteral(String),
}
