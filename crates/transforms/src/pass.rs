use crate::{PassConfig, Transform};
use classcloak_analysis::{collect_metrics, compare};
use classcloak_core::ProgramBundle;
use classcloak_utils::errors::TransformError;
use rand::rngs::StdRng;
use tracing::info;

/// Runs a sequence of obfuscation transforms over a program.
pub trait Pass {
    /// Applies `passes` in order, returning the names of those whose result was kept.
    fn run(
        &self,
        bundle: &mut ProgramBundle,
        passes: &[Box<dyn Transform>],
        cfg: &PassConfig,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, TransformError>;
}

/// Default implementation of the Pass trait.
///
/// Each transform runs on a snapshot; the snapshot replaces the program when
/// the potency delta clears the threshold or the run is aggressive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPass;

impl Pass for DefaultPass {
    fn run(
        &self,
        bundle: &mut ProgramBundle,
        passes: &[Box<dyn Transform>],
        cfg: &PassConfig,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, TransformError> {
        let mut applied = Vec::new();

        for pass in passes {
            let before = collect_metrics(&bundle.program);
            let mut snapshot = bundle.clone();

            let mutated = pass.apply(&mut snapshot, rng)?;
            if !mutated {
                info!("{:>16} unchanged", pass.name());
                continue;
            }

            let after = collect_metrics(&snapshot.program);
            let delta = compare(&before, &after);

            let keep = delta >= cfg.accept_threshold || cfg.aggressive;
            info!(
                "{:>16} Δ{:+.2} {}",
                pass.name(),
                delta,
                if keep { "✓" } else { "×" }
            );

            if keep {
                *bundle = snapshot;
                applied.push(pass.name().to_string());
            }
        }
        Ok(applied)
    }
}

/// Convenience function to run the default pass.
pub fn run(
    bundle: &mut ProgramBundle,
    passes: &[Box<dyn Transform>],
    cfg: &PassConfig,
    rng: &mut StdRng,
) -> Result<Vec<String>, TransformError> {
    DefaultPass.run(bundle, passes, cfg, rng)
}
