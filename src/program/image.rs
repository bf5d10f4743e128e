//! In-memory [`Program`] implementation.
//!
//! [`ProgramImage`] holds an already-loaded address space as a set of byte segments plus
//! lookup tables for metadata usages, methods and key functions. Hosts that load a real
//! binary populate it once with [`ProgramImageBuilder`] and share it between lifts.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    isil::InstructionSet,
    program::{KeyFunction, MetadataUsage, MethodDef, Program, TypeDef, TypeId},
};

/// A loaded program image.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    instruction_set: InstructionSet,
    segments: BTreeMap<u64, Vec<u8>>,
    types: HashMap<TypeId, TypeDef>,
    methods: HashMap<u64, Arc<MethodDef>>,
    key_functions: HashMap<u64, KeyFunction>,
    globals: HashMap<u64, MetadataUsage>,
}

impl ProgramImage {
    /// Starts building an image for the given instruction-set family.
    #[must_use]
    pub fn builder(instruction_set: InstructionSet) -> ProgramImageBuilder {
        ProgramImageBuilder {
            image: ProgramImage {
                instruction_set,
                segments: BTreeMap::new(),
                types: HashMap::new(),
                methods: HashMap::new(),
                key_functions: HashMap::new(),
                globals: HashMap::new(),
            },
        }
    }

    /// Returns all methods with a known entry point.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDef>> {
        self.methods.values()
    }
}

impl Program for ProgramImage {
    fn instruction_set(&self) -> InstructionSet {
        self.instruction_set
    }

    fn bytes_at(&self, address: u64) -> Option<&[u8]> {
        let (base, data) = self.segments.range(..=address).next_back()?;
        let offset = usize::try_from(address - base).ok()?;
        data.get(offset..).filter(|rest| !rest.is_empty())
    }

    fn global_at(&self, address: u64) -> Option<MetadataUsage> {
        self.globals.get(&address).cloned()
    }

    fn method_at(&self, address: u64) -> Option<Arc<MethodDef>> {
        self.methods.get(&address).cloned()
    }

    fn key_function_at(&self, address: u64) -> Option<KeyFunction> {
        self.key_functions.get(&address).copied()
    }

    fn type_def(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(&id)
    }
}

/// Builder for [`ProgramImage`].
#[derive(Debug)]
pub struct ProgramImageBuilder {
    image: ProgramImage,
}

impl ProgramImageBuilder {
    /// Maps `bytes` at virtual address `base`.
    #[must_use]
    pub fn segment(mut self, base: u64, bytes: Vec<u8>) -> Self {
        self.image.segments.insert(base, bytes);
        self
    }

    /// Registers a type definition.
    #[must_use]
    pub fn type_def(mut self, def: TypeDef) -> Self {
        self.image.types.insert(def.id, def);
        self
    }

    /// Registers a method at its entry point. Methods without an address are ignored.
    #[must_use]
    pub fn method(mut self, method: MethodDef) -> Self {
        if let Some(address) = method.address {
            self.image.methods.insert(address, Arc::new(method));
        }
        self
    }

    /// Registers a runtime helper at `address`.
    #[must_use]
    pub fn key_function(mut self, address: u64, function: KeyFunction) -> Self {
        self.image.key_functions.insert(address, function);
        self
    }

    /// Registers a metadata usage slot at `address`.
    #[must_use]
    pub fn global(mut self, address: u64, usage: MetadataUsage) -> Self {
        self.image.globals.insert(address, usage);
        self
    }

    /// Finishes the image.
    #[must_use]
    pub fn build(self) -> ProgramImage {
        self.image
    }
}
