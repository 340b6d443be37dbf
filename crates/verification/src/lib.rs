//! Classcloak Equivalence Verification
//!
//! This crate checks that an obfuscated program behaves like the program it
//! came from through:
//!
//! 1. **Reference Interpreter**: executes the instruction model directly, with
//!    a small modelled slice of the platform library
//! 2. **Practical Testing**: differential runs of entry calls, optionally
//!    swept across many obfuscation seeds

pub mod config;
pub mod interp;
pub mod practical;

pub use classcloak_utils::errors::VerificationError;
pub use config::{VerificationConfig, VerificationLevel};
pub use interp::{Arg, Call, Observed, Outcome, Termination, execute};
pub use practical::{EquivalenceResults, Mismatch, PracticalTester, TestCase};

/// Result type for verification operations
pub type VerificationResult<T> = Result<T, VerificationError>;
