/// Module for the default command, which obfuscates an archive.
///
/// The archive is loaded, the selected transforms run over its program under the
/// keep rules, and the result is written next to the input unless an output path
/// is given. A JSON run report can be emitted alongside.
use async_trait::async_trait;
use classcloak_core::codec::JsonCodec;
use classcloak_core::keep::KeepRules;
use classcloak_transform::obfuscator::{
    ObfuscationConfig, all_transforms, create_report, obfuscate_archive,
    print_obfuscation_analysis, transforms_by_name,
};
use classcloak_transform::PassConfig;
use clap::Args;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Arguments for obfuscating an archive.
#[derive(Args, Debug, Default)]
pub struct ObfuscateArgs {
    /// Input archive
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Output archive (default: input name with `-obf` before the extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Comma-separated transformers, case-insensitive (default: all, in registration order)
    #[arg(short = 't', long = "transformers", value_delimiter = ',')]
    pub transformers: Vec<String>,
    /// Comma-separated keep rules (`pkg.Type`, `pkg.*`, `pkg.**`, `pkg.Type.member`)
    #[arg(short, long)]
    pub keep: Option<String>,
    /// Seed for a reproducible run (default: drawn at random and reported)
    #[arg(long)]
    pub seed: Option<u64>,
    /// Do not write the version banner ahead of the archive data
    #[arg(long)]
    pub no_banner: bool,
    /// Path to emit a JSON run report
    #[arg(long)]
    pub emit: Option<PathBuf>,
    /// Smallest method body, in executable instructions, that gets flattened
    #[arg(long, default_value_t = 12)]
    pub min_flatten: usize,
}

/// `dir/app.jar` → `dir/app-obf.jar`; `app` → `app-obf`.
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}-obf.{}", ext.to_string_lossy()),
        None => format!("{stem}-obf"),
    };
    input.with_file_name(name)
}

#[async_trait]
impl super::Command for ObfuscateArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let input = self.input.ok_or("missing required argument --input <PATH>")?;
        let output = self.output.unwrap_or_else(|| default_output(&input));

        let pass_config = PassConfig {
            keep: self.keep.as_deref().map(KeepRules::parse_list).unwrap_or_default(),
            min_flatten_insns: self.min_flatten,
            ..PassConfig::default()
        };
        let transforms = if self.transformers.is_empty() {
            all_transforms(&pass_config)
        } else {
            let (transforms, unknown) = transforms_by_name(&self.transformers, &pass_config);
            for name in unknown {
                eprintln!("warning: unknown transformer `{name}` skipped");
            }
            transforms
        };

        println!("Loading {}", input.display());
        let data = tokio::fs::read(&input).await?;
        println!("Applying {} transforms...", transforms.len());

        let config = ObfuscationConfig {
            seed: self.seed,
            transforms,
            pass_config,
            banner: !self.no_banner,
        };
        let (bytes, result) = obfuscate_archive(&data, config, &JsonCodec)?;
        tokio::fs::write(&output, &bytes).await?;

        print_obfuscation_analysis(&result);
        if let Some(path) = self.emit {
            let report = create_report(&result);
            tokio::fs::write(&path, serde_json::to_string_pretty(&report)?).await?;
            println!("Wrote report to {}", path.display());
        }
        println!("Wrote {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_inserts_suffix() {
        assert_eq!(default_output(Path::new("dir/app.jar")), PathBuf::from("dir/app-obf.jar"));
        assert_eq!(default_output(Path::new("app")), PathBuf::from("app-obf"));
        assert_eq!(
            default_output(Path::new("lib.v2.zip")),
            PathBuf::from("lib.v2-obf.zip")
        );
    }
}
