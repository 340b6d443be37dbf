/// Module for the `verify` subcommand.
///
/// Loads an original and an obfuscated archive, runs each one's `Main-Class`
/// entry point on the reference interpreter, and compares the printed output and
/// termination. Renamed entry points are followed through the obfuscated
/// archive's rewritten manifest.
use async_trait::async_trait;
use classcloak_core::archive::Archive;
use classcloak_core::manifest::MAIN_CLASS;
use classcloak_verification::{Call, PracticalTester, TestCase, VerificationConfig};
use clap::Args;
use std::error::Error;
use std::path::PathBuf;

#[derive(Args)]
pub struct VerifyArgs {
    /// Archive before obfuscation
    #[arg(long)]
    pub original: PathBuf,
    /// Archive after obfuscation
    #[arg(long)]
    pub obfuscated: PathBuf,
    /// Entry type of the original, overriding its manifest
    #[arg(long)]
    pub main_class: Option<String>,
    /// Instructions each run may execute
    #[arg(long)]
    pub step_limit: Option<u64>,
}

fn entry_of(archive: &Archive, fallback: Option<&str>) -> Option<String> {
    fallback
        .or_else(|| archive.bundle.manifest.get(MAIN_CLASS))
        .map(|name| name.trim().replace('.', "/"))
}

#[async_trait]
impl super::Command for VerifyArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let original = super::load_archive(&self.original).await?;
        let obfuscated = super::load_archive(&self.obfuscated).await?;

        let original_main = entry_of(&original, self.main_class.as_deref())
            .ok_or("original archive has no Main-Class; pass --main-class")?;
        let obfuscated_main = match entry_of(&obfuscated, None) {
            Some(main) => main,
            None if self.main_class.is_some() => original_main.clone(),
            None => return Err("obfuscated archive has no Main-Class".into()),
        };
        tracing::info!("comparing {} with {}", original_main, obfuscated_main);

        let mut config = VerificationConfig::standard();
        if let Some(limit) = self.step_limit {
            config.step_limit = limit;
        }
        let tester = PracticalTester::new(config)?;
        let case = TestCase {
            original: Call::Main {
                class: original_main,
            },
            obfuscated: Call::Main {
                class: obfuscated_main,
            },
        };
        let results = tester.test_equivalence(
            &original.bundle.program,
            &obfuscated.bundle.program,
            &[case],
        )?;

        if results.overall_passed {
            println!("✅ Behaviour matches ({:.2}s)", results.testing_time.as_secs_f64());
            Ok(())
        } else {
            for mismatch in &results.mismatches {
                println!("expected: {:?}", mismatch.expected);
                println!("actual:   {:?}", mismatch.actual);
            }
            Err("obfuscated archive behaves differently".into())
        }
    }
}
