//! Lifting configuration.
//!
//! CFG construction, instruction transformation and variable promotion always run; the
//! remaining passes are selected with [`LiftPasses`]. The default configuration enables
//! every pass and runs the expression inliner once, which keeps copy chains that only
//! collapse after folding visible in the output.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Optional pipeline passes
    pub struct LiftPasses: u32 {
        /// Bind entry registers to `this` and declared parameters
        const SEED_PARAMETERS = 0x0001;
        /// Recover field accesses and propagate variable types
        const DATAFLOW = 0x0002;
        /// Replace addresses of metadata usage slots with the resolved usage
        const METADATA = 0x0004;
        /// Replace dereferenced string addresses with literals
        const STRINGS = 0x0008;
        /// Fold arithmetic on constants
        const FOLD_CONSTANTS = 0x0010;
        /// Inline single-definition, single-use variables
        const INLINE = 0x0020;
        /// Absorb single-predecessor branch targets into structured conditionals
        const STRUCTURE = 0x0040;
    }
}

/// Configuration for one lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiftOptions {
    /// Enabled optional passes
    pub passes: LiftPasses,

    /// Upper bound on rounds of the data-flow / metadata / string / folding fixed point
    pub max_fixpoint_iterations: usize,

    /// Re-run the inliner (followed by folding) until it stops changing the method
    /// instead of running it once
    pub inline_to_fixpoint: bool,

    /// Upper bound on inliner rounds when `inline_to_fixpoint` is set
    pub max_inline_rounds: usize,

    /// Dereferenced immediates at or below this value are never treated as string
    /// addresses (default: 1000)
    pub min_string_address: u64,
}

impl Default for LiftOptions {
    fn default() -> Self {
        Self {
            passes: LiftPasses::all(),
            max_fixpoint_iterations: 32,
            inline_to_fixpoint: false,
            max_inline_rounds: 16,
            min_string_address: 1000,
        }
    }
}

impl LiftOptions {
    /// Lifts to promoted variables without any rewriting passes.
    ///
    /// Useful to inspect the raw shape a method lifts to.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            passes: LiftPasses::empty(),
            ..Self::default()
        }
    }

    /// Enables every pass and iterates the inliner to a fixed point.
    #[must_use]
    pub fn full() -> Self {
        Self {
            inline_to_fixpoint: true,
            ..Self::default()
        }
    }

    /// Returns `true` if `pass` is enabled.
    #[must_use]
    pub fn enabled(&self, pass: LiftPasses) -> bool {
        self.passes.contains(pass)
    }

    /// Returns a copy with `pass` enabled or disabled.
    #[must_use]
    pub fn with(mut self, pass: LiftPasses, enabled: bool) -> Self {
        self.passes.set(pass, enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = LiftOptions::default();
        assert!(default.enabled(LiftPasses::INLINE));
        assert!(!default.inline_to_fixpoint);

        assert!(LiftOptions::minimal().passes.is_empty());
        assert!(LiftOptions::full().inline_to_fixpoint);
    }

    #[test]
    fn test_with_toggles_single_pass() {
        let options = LiftOptions::default().with(LiftPasses::STRUCTURE, false);
        assert!(!options.enabled(LiftPasses::STRUCTURE));
        assert!(options.enabled(LiftPasses::DATAFLOW));
    }
}
