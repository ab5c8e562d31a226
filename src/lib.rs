//! scenedec — decompiler for SceneScript scene-bank bytecode.
//!
//! A scene bank holds flat stack-machine instruction sequences; this crate
//! reconstructs structured source from them: control flow from jump-target
//! geometry, expressions from backward stack-effect bookkeeping, and
//! variable types from constraint propagation over a value-flow graph.

pub mod bytecode;
pub mod decompiler;
pub mod error;
pub mod tables;
pub mod writer;

pub use decompiler::{decompile_bank, BankOutput};
pub use error::{BankError, DecompileError};

/// Heuristic effort level.
///
/// Higher levels trade extra full-file walks for type-inference accuracy;
/// the schedule is tuning policy, not a correctness requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Effort {
    /// No type tracking at all.
    Off,
    /// Record edges and direct observations only.
    Low,
    /// Plus the global resolution fixpoint.
    #[default]
    Standard,
    /// Plus a suppressed-output pre-pass seeding cross-script edges.
    Full,
}

impl Effort {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Effort::Off,
            1 => Effort::Low,
            2 => Effort::Standard,
            _ => Effort::Full,
        }
    }
}

/// Configuration for one decompile run.
#[derive(Debug, Clone)]
pub struct DecompilerOptions {
    /// Heuristic effort level.
    pub effort: Effort,
    /// Align output statements to recorded source lines with blank lines.
    pub align_lines: bool,
}

impl Default for DecompilerOptions {
    fn default() -> Self {
        Self {
            effort: Effort::Standard,
            align_lines: false,
        }
    }
}

impl DecompilerOptions {
    /// Create a new builder for `DecompilerOptions`.
    pub fn builder() -> DecompilerOptionsBuilder {
        DecompilerOptionsBuilder::default()
    }
}

/// Builder for `DecompilerOptions` with fluent API.
#[derive(Default)]
pub struct DecompilerOptionsBuilder {
    effort: Option<Effort>,
    align_lines: Option<bool>,
}

impl DecompilerOptionsBuilder {
    pub fn effort(mut self, effort: Effort) -> Self {
        self.effort = Some(effort);
        self
    }

    pub fn align_lines(mut self, align: bool) -> Self {
        self.align_lines = Some(align);
        self
    }

    pub fn build(self) -> DecompilerOptions {
        let defaults = DecompilerOptions::default();
        DecompilerOptions {
            effort: self.effort.unwrap_or(defaults.effort),
            align_lines: self.align_lines.unwrap_or(defaults.align_lines),
        }
    }
}
