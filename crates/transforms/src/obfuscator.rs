use crate::class_rename::ClassRename;
use crate::field_rename::FieldRename;
use crate::flatten::FlowObfuscation;
use crate::method_rename::MethodRename;
use crate::{pass, PassConfig, Transform};
use classcloak_analysis::{collect_metrics, Metrics};
use classcloak_core::archive::{Archive, WriteOptions};
use classcloak_core::codec::ClassCodec;
use classcloak_core::validate::validate_program;
use classcloak_core::ProgramBundle;
use classcloak_utils::errors::{ObfuscateError, TransformError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Registered passes, in their default order.
pub const TRANSFORM_NAMES: [&str; 4] = ["ClassRename", "MethodRename", "FieldRename", "FlowObfuscation"];

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the obfuscation pipeline
pub struct ObfuscationConfig {
    /// Seed for the shared generator; `None` draws one from the OS
    pub seed: Option<u64>,
    /// Transforms to apply, in order
    pub transforms: Vec<Box<dyn Transform>>,
    /// Pass configuration for transform behavior
    pub pass_config: PassConfig,
    /// Write the `classcloak <version>` line ahead of the zip data
    pub banner: bool,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            transforms: Vec::new(),
            pass_config: PassConfig::default(),
            banner: true,
        }
    }
}

impl std::fmt::Debug for ObfuscationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationConfig")
            .field("seed", &self.seed)
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("pass_config", &self.pass_config)
            .field("banner", &self.banner)
            .finish()
    }
}

/// Result of the obfuscation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationResult {
    /// Input container size in bytes
    pub original_size: usize,
    /// Output container size in bytes, banner included
    pub obfuscated_size: usize,
    /// Size increase as percentage
    pub size_increase_percentage: f64,
    /// Compiled units carried through
    pub types: usize,
    /// Non-class entries carried through
    pub resources: usize,
    /// Program metrics before any pass ran
    pub before: Metrics,
    /// Program metrics after the last pass
    pub after: Metrics,
    /// Metadata about the obfuscation process
    pub metadata: ObfuscationMetadata,
}

/// What a run did, for replay and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationMetadata {
    /// Names of transforms whose result was kept
    pub transforms_applied: Vec<String>,
    /// Seed used for the obfuscation
    pub seed_used: u64,
    /// Whether the banner line was written
    pub banner: bool,
}

/// Looks up registered passes by name, ignoring case. Unknown names are
/// returned separately and logged.
pub fn transforms_by_name<S: AsRef<str>>(
    names: &[S],
    pass_config: &PassConfig,
) -> (Vec<Box<dyn Transform>>, Vec<String>) {
    let mut transforms: Vec<Box<dyn Transform>> = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        let config = pass_config.clone();
        match name.to_ascii_lowercase().as_str() {
            "classrename" => transforms.push(Box::new(ClassRename::new(config))),
            "methodrename" => transforms.push(Box::new(MethodRename::new(config))),
            "fieldrename" => transforms.push(Box::new(FieldRename::new(config))),
            "flowobfuscation" => transforms.push(Box::new(FlowObfuscation::new(config))),
            _ => {
                tracing::warn!("Unknown transformer `{}`, skipping", name);
                unknown.push(name.to_string());
            }
        }
    }
    (transforms, unknown)
}

/// Every registered pass in default order.
pub fn all_transforms(pass_config: &PassConfig) -> Vec<Box<dyn Transform>> {
    transforms_by_name(&TRANSFORM_NAMES, pass_config).0
}

/// Runs the configured passes over an in-memory program and checks that every
/// method body is still well formed.
pub fn obfuscate_bundle(
    bundle: &mut ProgramBundle,
    transforms: &[Box<dyn Transform>],
    pass_config: &PassConfig,
    seed: u64,
) -> Result<Vec<String>, TransformError> {
    let mut rng = StdRng::seed_from_u64(seed);
    tracing::debug!(
        "Applying {} transforms with shared RNG seed 0x{:x}",
        transforms.len(),
        seed
    );
    let applied = pass::run(bundle, transforms, pass_config, &mut rng)?;
    for ty in bundle.program.types_mut() {
        ty.require_code_version();
    }
    validate_program(&bundle.program)?;
    Ok(applied)
}

/// Main obfuscation pipeline: container bytes in, container bytes out.
pub fn obfuscate_archive(
    input: &[u8],
    config: ObfuscationConfig,
    codec: &dyn ClassCodec,
) -> Result<(Vec<u8>, ObfuscationResult), ObfuscateError> {
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let original_size = input.len();

    tracing::debug!("Starting obfuscation pipeline:");
    tracing::debug!("  Input size: {} bytes", original_size);
    tracing::debug!("  Seed: 0x{:x}", seed);
    tracing::debug!("  Transforms: {:?}", config);

    let mut archive = Archive::read(input, codec)?;
    tracing::debug!(
        "  Loaded {} types, {} resources",
        archive.bundle.program.len(),
        archive.resources.len()
    );

    let before = collect_metrics(&archive.bundle.program);
    let transforms_applied =
        obfuscate_bundle(&mut archive.bundle, &config.transforms, &config.pass_config, seed)?;
    let after = collect_metrics(&archive.bundle.program);

    let options = WriteOptions {
        banner: config.banner.then(|| format!("classcloak {VERSION}\n")),
        comment: Some(format!("classcloak {VERSION}")),
    };
    let output = archive.write(codec, &options)?;
    let obfuscated_size = output.len();

    let size_increase_percentage = if original_size > 0 {
        ((obfuscated_size as f64 - original_size as f64) / original_size as f64) * 100.0
    } else {
        0.0
    };

    let result = ObfuscationResult {
        original_size,
        obfuscated_size,
        size_increase_percentage,
        types: archive.bundle.program.len(),
        resources: archive.resources.len(),
        before,
        after,
        metadata: ObfuscationMetadata {
            transforms_applied,
            seed_used: seed,
            banner: config.banner,
        },
    };
    Ok((output, result))
}

/// Prints a short summary of the run.
pub fn print_obfuscation_analysis(result: &ObfuscationResult) {
    println!("Transform Analysis:");
    println!("Types: {}, resources: {}", result.types, result.resources);
    println!(
        "Applied {} transforms: {:?}",
        result.metadata.transforms_applied.len(),
        result.metadata.transforms_applied
    );
    println!(
        "Instructions: {} → {}, handlers: {} → {}",
        result.before.insn_cnt, result.after.insn_cnt, result.before.handler_cnt, result.after.handler_cnt
    );
    println!("Seed: {}", result.metadata.seed_used);
    println!(
        "Size change: {} → {} bytes ({:+.1}%)",
        result.original_size, result.obfuscated_size, result.size_increase_percentage
    );
}

/// Machine-readable run report.
pub fn create_report(result: &ObfuscationResult) -> serde_json::Value {
    json!({
        "original_bytes": result.original_size,
        "obfuscated_bytes": result.obfuscated_size,
        "size_delta_bytes": (result.obfuscated_size as i64 - result.original_size as i64),
        "percent_size": result.size_increase_percentage,
        "types": result.types,
        "resources": result.resources,
        "metrics_before": result.before,
        "metrics_after": result.after,
        "transforms_applied": result.metadata.transforms_applied,
        "seed_used": result.metadata.seed_used,
        "banner": result.metadata.banner,
    })
}

/// Ready-made pipeline configurations
pub mod presets {
    use super::*;

    /// Every registered pass
    pub fn default_obfuscation(seed: Option<u64>) -> ObfuscationConfig {
        let pass_config = PassConfig::default();
        ObfuscationConfig {
            seed,
            transforms: all_transforms(&pass_config),
            pass_config,
            banner: true,
        }
    }

    /// Identifier renaming only; method bodies keep their shape
    pub fn rename_only(seed: Option<u64>) -> ObfuscationConfig {
        let pass_config = PassConfig::default();
        ObfuscationConfig {
            seed,
            transforms: transforms_by_name(&TRANSFORM_NAMES[..3], &pass_config).0,
            pass_config,
            banner: true,
        }
    }

    /// Flattening only, with a custom size floor
    pub fn flatten_only(seed: Option<u64>, min_flatten_insns: usize) -> ObfuscationConfig {
        let pass_config = PassConfig {
            min_flatten_insns,
            ..PassConfig::default()
        };
        ObfuscationConfig {
            seed,
            transforms: vec![Box::new(FlowObfuscation::new(pass_config.clone()))],
            pass_config,
            banner: true,
        }
    }
}
