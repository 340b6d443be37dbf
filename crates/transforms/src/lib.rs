pub mod class_rename;
pub mod field_rename;
pub mod flatten;
pub mod method_rename;
pub mod names;
pub mod obfuscator;
pub mod pass;

use classcloak_core::keep::KeepRules;
use classcloak_core::ProgramBundle;
use classcloak_utils::errors::TransformError;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Trait for program obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the program, returning whether changes were made.
    fn apply(&self, bundle: &mut ProgramBundle, rng: &mut StdRng) -> Result<bool, TransformError>;
}

/// Configuration for transform passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Types and members no pass may rename or rewrite
    pub keep: KeepRules,
    /// Smallest method body (in executable instructions) eligible for flattening
    pub min_flatten_insns: usize,
    /// Minimum quality threshold for accepting transforms
    pub accept_threshold: f64,
    /// Apply transforms aggressively without quality gates
    pub aggressive: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            keep: KeepRules::default(),
            min_flatten_insns: 12,
            accept_threshold: 0.0,
            aggressive: true,
        }
    }
}
