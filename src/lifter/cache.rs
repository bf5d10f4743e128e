//! Reuse of lifted methods across renderings.
//!
//! Hosts typically render the same method many times (switching views, re-colorizing,
//! searching). [`LiftCache`] keeps lifted results keyed by method identity so each method
//! is lifted once until it is invalidated. The cache is safe to share between threads.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    isil::Instruction,
    lifter::lift::{LiftedMethod, Lifter},
    program::{MethodDef, MethodId},
};

/// Concurrent map from method identity to its lifted form.
#[derive(Debug, Default)]
pub struct LiftCache {
    entries: DashMap<MethodId, Arc<LiftedMethod>>,
}

impl LiftCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        LiftCache {
            entries: DashMap::new(),
        }
    }

    /// Returns the cached lift of `method`, lifting and storing it first if needed.
    ///
    /// Concurrent callers asking for the same method may both lift it; the first result
    /// stored wins and is returned to both.
    pub fn get_or_lift(
        &self,
        lifter: &Lifter<'_>,
        method: &MethodDef,
        instructions: &[Instruction],
    ) -> Arc<LiftedMethod> {
        if let Some(hit) = self.get(method.id) {
            return hit;
        }

        let lifted = Arc::new(lifter.lift(method, instructions));
        self.entries.entry(method.id).or_insert(lifted).value().clone()
    }

    /// Returns the cached lift of a method.
    #[must_use]
    pub fn get(&self, method: MethodId) -> Option<Arc<LiftedMethod>> {
        self.entries.get(&method).map(|entry| entry.value().clone())
    }

    /// Stores a lifted method, replacing any earlier entry for the same method.
    pub fn insert(&self, lifted: LiftedMethod) -> Arc<LiftedMethod> {
        let lifted = Arc::new(lifted);
        self.entries.insert(lifted.method, lifted.clone());
        lifted
    }

    /// Drops the entry for a method. Returns `true` if there was one.
    pub fn invalidate(&self, method: MethodId) -> bool {
        self.entries.remove(&method).is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of cached methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
