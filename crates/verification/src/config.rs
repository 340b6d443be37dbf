//! Verification configuration and settings

use classcloak_utils::errors::VerificationError;
use serde::{Deserialize, Serialize};

/// Controls how far the interpreter may run and how many seeds an equivalence
/// sweep covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Level of verification to perform
    pub verification_level: VerificationLevel,
    /// Executed instructions allowed per run
    pub step_limit: u64,
    /// Maximum call nesting
    pub max_depth: usize,
    /// First value `System.nanoTime` returns, minus one step
    pub nano_time_start: i64,
    /// Clock advance per `System.nanoTime` call
    pub nano_time_step: i64,
    /// Number of obfuscation seeds a sweep tries
    pub seed_count: u64,
    /// Stop a sweep at its first mismatch
    pub fail_fast: bool,
}

/// Different levels of verification thoroughness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationLevel {
    /// A handful of seeds, for development
    Quick,
    /// Balanced, for CI
    Standard,
    /// Exhaustive
    Comprehensive,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl VerificationConfig {
    /// Quick verification configuration for development
    pub const fn development() -> Self {
        Self {
            verification_level: VerificationLevel::Quick,
            step_limit: 100_000,
            max_depth: 64,
            nano_time_start: 1_000_000,
            nano_time_step: 1_337,
            seed_count: 16,
            fail_fast: true,
        }
    }

    /// Standard verification configuration for CI
    pub const fn standard() -> Self {
        Self {
            verification_level: VerificationLevel::Standard,
            step_limit: 1_000_000,
            max_depth: 256,
            nano_time_start: 81_985_529_216_486_895,
            nano_time_step: 7_919,
            seed_count: 200,
            fail_fast: false,
        }
    }

    /// Thousand-seed sweep
    pub const fn comprehensive() -> Self {
        Self {
            verification_level: VerificationLevel::Comprehensive,
            step_limit: 5_000_000,
            max_depth: 512,
            nano_time_start: -42,
            nano_time_step: 104_729,
            seed_count: 1_000,
            fail_fast: false,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), VerificationError> {
        if self.step_limit == 0 {
            return Err(VerificationError::Configuration(
                "step_limit must be greater than 0".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(VerificationError::Configuration(
                "max_depth must be greater than 0".to_string(),
            ));
        }
        if self.seed_count == 0 {
            return Err(VerificationError::Configuration(
                "seed_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
