use crate::fixtures::{app_archive, init_tracing};
use classcloak_core::archive::Archive;
use classcloak_core::codec::JsonCodec;
use classcloak_core::keep::KeepRules;
use classcloak_core::manifest::MAIN_CLASS;
use classcloak_transform::obfuscator::{ObfuscationConfig, create_report, obfuscate_archive, presets};
use classcloak_transform::PassConfig;
use classcloak_verification::{Call, Outcome, VerificationConfig, execute};

fn run_main(archive: &Archive) -> Outcome {
    let main = archive
        .bundle
        .manifest
        .get(MAIN_CLASS)
        .expect("entry point survives")
        .replace('.', "/");
    execute(
        &archive.bundle.program,
        &Call::Main { class: main },
        &VerificationConfig::standard(),
    )
    .unwrap()
}

#[test]
fn default_pipeline_preserves_main() {
    init_tracing();
    let input = app_archive();
    let expected = run_main(&Archive::read(&input, &JsonCodec).unwrap());

    for seed in 0..25 {
        let (output, result) =
            obfuscate_archive(&input, presets::default_obfuscation(Some(seed)), &JsonCodec).unwrap();
        let archive = Archive::read(&output, &JsonCodec).unwrap();

        assert!(!archive.bundle.program.contains("app/Calc"), "seed {seed}");
        assert_ne!(archive.bundle.manifest.get(MAIN_CLASS), Some("app.Main"));
        assert_eq!(result.metadata.seed_used, seed);
        assert!(
            result.metadata.transforms_applied.iter().any(|t| t == "FlowObfuscation"),
            "seed {seed} applied {:?}",
            result.metadata.transforms_applied
        );
        assert!(result.after.handler_cnt > result.before.handler_cnt);

        assert_eq!(run_main(&archive), expected, "seed {seed}");
    }
}

#[test]
fn same_seed_same_program() {
    let input = app_archive();
    let run = || {
        let (output, _) =
            obfuscate_archive(&input, presets::default_obfuscation(Some(99)), &JsonCodec).unwrap();
        Archive::read(&output, &JsonCodec).unwrap().bundle
    };
    assert_eq!(run(), run());
}

#[test]
fn kept_entry_point_keeps_its_name() {
    let input = app_archive();
    let mut config = presets::default_obfuscation(Some(5));
    let pass_config = PassConfig {
        keep: KeepRules::parse_list("app.Main"),
        ..PassConfig::default()
    };
    config.transforms = classcloak_transform::obfuscator::all_transforms(&pass_config);
    config.pass_config = pass_config;

    let (output, result) = obfuscate_archive(&input, config, &JsonCodec).unwrap();
    let archive = Archive::read(&output, &JsonCodec).unwrap();
    assert!(archive.bundle.program.contains("app/Main"));
    assert!(!archive.bundle.program.contains("app/Calc"));
    assert_eq!(archive.bundle.manifest.get(MAIN_CLASS), Some("app.Main"));

    let report = create_report(&result);
    assert_eq!(report["seed_used"], 5);
    assert_eq!(report["types"], 2);
}

#[test]
fn rename_only_leaves_bodies_unflattened() {
    let input = app_archive();
    let config: ObfuscationConfig = presets::rename_only(Some(3));
    let (_, result) = obfuscate_archive(&input, config, &JsonCodec).unwrap();
    assert_eq!(result.before.handler_cnt, result.after.handler_cnt);
    assert_eq!(result.before.insn_cnt, result.after.insn_cnt);
    assert!(!result.metadata.transforms_applied.contains(&"FlowObfuscation".to_string()));
}
