//! Configuration for the decompiler.
//!
//! This module provides [`DecompilerConfig`], which controls the type inference budgets and
//! the reconstruction and rendering options of a [`crate::Decompiler`] run.

/// Configuration for the decompiler.
///
/// Controls the retry budgets of type inference, the refinement rounds that run after it,
/// and how reconstruction runs and renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerConfig {
    /// Log a warning for every subroutine whose prototype did not converge (default: false).
    ///
    /// Non-convergence never aborts the run; strict mode only raises the log level.
    pub strict: bool,

    /// Path retry budget of each inference pass, `None` meaning unbounded
    /// (default: `[10, 15, 25, unbounded]`).
    pub pass_budgets: [Option<usize>; 4],

    /// Hard cap on branch decisions queued for one subroutine (default: 3000).
    pub max_decisions: usize,

    /// Maximum re-walks of partially typed prototypes after the SCC passes (default: 4).
    pub refinement_rounds: usize,

    /// Reconstruct subroutines on the rayon pool (default: true).
    pub parallel: bool,

    /// Omit trailing action arguments equal to their catalog default (default: true).
    pub omit_default_args: bool,

    /// One level of indentation in rendered source (default: four spaces).
    pub indent: String,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            strict: false,
            pass_budgets: [Some(10), Some(15), Some(25), None],
            max_decisions: 3000,
            refinement_rounds: 4,
            parallel: true,
            omit_default_args: true,
            indent: "    ".to_string(),
        }
    }
}

impl DecompilerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that runs single-threaded and keeps every argument.
    ///
    /// Output of this configuration mirrors the instruction stream most closely.
    #[must_use]
    pub fn literal() -> Self {
        Self {
            parallel: false,
            omit_default_args: false,
            ..Self::default()
        }
    }

    /// Sets strict mode.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the retry budgets of the four inference passes.
    #[must_use]
    pub fn with_pass_budgets(mut self, budgets: [Option<usize>; 4]) -> Self {
        self.pass_budgets = budgets;
        self
    }

    /// Sets the decision cap per subroutine.
    #[must_use]
    pub fn with_max_decisions(mut self, max: usize) -> Self {
        self.max_decisions = max;
        self
    }

    /// Sets the number of refinement rounds.
    #[must_use]
    pub fn with_refinement_rounds(mut self, rounds: usize) -> Self {
        self.refinement_rounds = rounds;
        self
    }

    /// Enables or disables parallel reconstruction.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables default argument omission.
    #[must_use]
    pub fn with_omit_default_args(mut self, omit: bool) -> Self {
        self.omit_default_args = omit;
        self
    }

    /// Sets the indentation unit.
    #[must_use]
    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let config = DecompilerConfig::default();
        assert_eq!(config.pass_budgets, [Some(10), Some(15), Some(25), None]);
        assert_eq!(config.max_decisions, 3000);
        assert!(!config.strict);
        assert_eq!(config.indent, "    ");
    }

    #[test]
    fn test_builder() {
        let config = DecompilerConfig::new()
            .with_strict(true)
            .with_max_decisions(50)
            .with_indent("\t");
        assert!(config.strict);
        assert_eq!(config.max_decisions, 50);
        assert_eq!(config.indent, "\t");

        let literal = DecompilerConfig::literal();
        assert!(!literal.parallel);
        assert!(!literal.omit_default_args);
    }
}
