//! Practical testing by differential execution
//!
//! Runs the same entry calls against the original and the obfuscated program
//! on the reference interpreter and compares what each run exposes:
//!
//! 1. **Termination**: the returned value, or the type of the uncaught exception
//! 2. **Output**: every line printed through `System.out` and `System.err`
//!
//! A seed sweep repeats the comparison over many obfuscation seeds.

use crate::config::VerificationConfig;
use crate::interp::{self, Call, Outcome};
use crate::{VerificationError, VerificationResult};
use classcloak_core::Program;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::{Duration, Instant};

/// Practical testing engine over the reference interpreter
#[derive(Debug, Clone)]
pub struct PracticalTester {
    config: VerificationConfig,
}

/// One entry call, addressed in each program's own names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Call against the original program
    pub original: Call,
    /// Call against the obfuscated program
    pub obfuscated: Call,
}

impl TestCase {
    /// A call whose target survives obfuscation under its own name.
    pub fn same(call: Call) -> Self {
        Self {
            original: call.clone(),
            obfuscated: call,
        }
    }
}

/// A case whose two runs disagreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Seed that produced the obfuscated program, when sweeping
    pub seed: Option<u64>,
    /// The case that diverged
    pub case: TestCase,
    /// Outcome of the original run
    pub expected: Outcome,
    /// Outcome of the obfuscated run, or why it could not be produced
    pub actual: Result<Outcome, String>,
}

/// Results of equivalence testing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalenceResults {
    /// Overall testing result
    pub overall_passed: bool,
    /// Number of case executions compared
    pub cases_executed: usize,
    /// Seeds tried (one for a single comparison)
    pub seeds_tried: u64,
    /// Every divergence found
    pub mismatches: Vec<Mismatch>,
    /// Total testing time
    pub testing_time: Duration,
}

impl PracticalTester {
    /// Create a new practical tester
    pub fn new(config: VerificationConfig) -> VerificationResult<Self> {
        config.validate()?;
        tracing::info!(
            "Initialized practical tester: {} steps per run, {} seeds per sweep",
            config.step_limit,
            config.seed_count
        );
        Ok(Self { config })
    }

    /// The settings runs are made with.
    pub const fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Compares every case once between two programs.
    ///
    /// The original must run to an outcome; an interpreter failure on the
    /// original side is an error rather than a mismatch.
    pub fn test_equivalence(
        &self,
        original: &Program,
        obfuscated: &Program,
        cases: &[TestCase],
    ) -> VerificationResult<EquivalenceResults> {
        let start_time = Instant::now();
        tracing::info!("Starting practical equivalence testing over {} cases", cases.len());

        let expected = self.baseline(original, cases)?;
        let mismatches = self.compare(obfuscated, cases, &expected, None);

        Ok(self.finish(start_time, cases.len(), 1, mismatches))
    }

    /// Obfuscates `original` once per seed in `0..seed_count` and compares every
    /// case against each result.
    ///
    /// A seed whose obfuscation fails counts one mismatch per case, carrying the
    /// failure text.
    pub fn sweep<F, E>(
        &self,
        original: &Program,
        cases: &[TestCase],
        mut obfuscate: F,
    ) -> VerificationResult<EquivalenceResults>
    where
        F: FnMut(u64) -> Result<Program, E>,
        E: Display,
    {
        let start_time = Instant::now();
        tracing::info!(
            "Starting seed sweep: {} seeds x {} cases",
            self.config.seed_count,
            cases.len()
        );

        let expected = self.baseline(original, cases)?;
        let mut mismatches = Vec::new();
        let mut seeds_tried = 0;
        let mut executed = 0;

        for seed in 0..self.config.seed_count {
            seeds_tried += 1;
            match obfuscate(seed) {
                Ok(program) => {
                    executed += cases.len();
                    mismatches.extend(self.compare(&program, cases, &expected, Some(seed)));
                }
                Err(e) => {
                    tracing::warn!("seed {} failed to obfuscate: {}", seed, e);
                    mismatches.extend(cases.iter().zip(&expected).map(|(case, outcome)| Mismatch {
                        seed: Some(seed),
                        case: case.clone(),
                        expected: outcome.clone(),
                        actual: Err(e.to_string()),
                    }));
                }
            }
            if self.config.fail_fast && !mismatches.is_empty() {
                tracing::debug!("stopping sweep at seed {}", seed);
                break;
            }
        }

        Ok(self.finish(start_time, executed, seeds_tried, mismatches))
    }

    fn baseline(&self, original: &Program, cases: &[TestCase]) -> VerificationResult<Vec<Outcome>> {
        cases
            .iter()
            .map(|case| interp::execute(original, &case.original, &self.config))
            .collect()
    }

    fn compare(
        &self,
        obfuscated: &Program,
        cases: &[TestCase],
        expected: &[Outcome],
        seed: Option<u64>,
    ) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        for (case, want) in cases.iter().zip(expected) {
            let actual = interp::execute(obfuscated, &case.obfuscated, &self.config)
                .map_err(|e: VerificationError| e.to_string());
            if actual.as_ref() != Ok(want) {
                tracing::debug!("mismatch on {:?} (seed {:?}): {:?}", case.obfuscated, seed, actual);
                mismatches.push(Mismatch {
                    seed,
                    case: case.clone(),
                    expected: want.clone(),
                    actual,
                });
                if self.config.fail_fast {
                    break;
                }
            }
        }
        mismatches
    }

    fn finish(
        &self,
        start_time: Instant,
        cases_executed: usize,
        seeds_tried: u64,
        mismatches: Vec<Mismatch>,
    ) -> EquivalenceResults {
        let overall_passed = mismatches.is_empty();
        let testing_time = start_time.elapsed();
        tracing::info!(
            "Practical testing completed in {:.2}s - Overall: {}",
            testing_time.as_secs_f64(),
            if overall_passed { "PASSED" } else { "FAILED" }
        );
        EquivalenceResults {
            overall_passed,
            cases_executed,
            seeds_tried,
            mismatches,
            testing_time,
        }
    }
}
