use crate::fixtures::{app_archive, init_tracing};
use classcloak_core::archive::Archive;
use classcloak_core::codec::JsonCodec;
use classcloak_core::manifest::MAIN_CLASS;
use classcloak_transform::obfuscator::{ObfuscationConfig, obfuscate_archive};
use classcloak_verification::{Call, Termination, VerificationConfig, execute};

fn run_main(archive: &Archive) -> classcloak_verification::Outcome {
    let main = archive
        .bundle
        .manifest
        .get(MAIN_CLASS)
        .expect("fixture names an entry point")
        .replace('.', "/");
    execute(
        &archive.bundle.program,
        &Call::Main { class: main },
        &VerificationConfig::development(),
    )
    .unwrap()
}

#[test]
fn zero_passes_preserve_behaviour() {
    init_tracing();
    let input = app_archive();
    let original = Archive::read(&input, &JsonCodec).unwrap();

    let config = ObfuscationConfig {
        seed: Some(11),
        ..Default::default()
    };
    let (output, result) = obfuscate_archive(&input, config, &JsonCodec).unwrap();
    assert!(result.metadata.transforms_applied.is_empty());
    assert_eq!(result.before, result.after, "no pass ran, metrics must agree");

    let reloaded = Archive::read(&output, &JsonCodec).unwrap();
    assert_eq!(reloaded.bundle.program, original.bundle.program);

    let want = run_main(&original);
    assert_eq!(want.termination, Termination::Returned(classcloak_verification::Observed::Void));
    assert_eq!(want.output, vec!["55", "value", "7", "1"]);
    assert_eq!(run_main(&reloaded), want);
}

#[test]
fn manifest_is_regenerated_in_order() {
    let input = app_archive();
    let (output, _) = obfuscate_archive(&input, ObfuscationConfig::default(), &JsonCodec).unwrap();
    let reloaded = Archive::read(&output, &JsonCodec).unwrap();

    let keys: Vec<&str> = reloaded.bundle.manifest.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["Manifest-Version", "Created-By", MAIN_CLASS]);
    assert_eq!(reloaded.bundle.manifest.get("created-by"), Some("fixtures"));
    assert_eq!(
        reloaded.resources.get("assets/readme.txt").map(Vec::as_slice),
        Some(&b"hello"[..])
    );
}

#[test]
fn banner_is_written_by_default() {
    let input = app_archive();
    let (output, result) = obfuscate_archive(&input, ObfuscationConfig::default(), &JsonCodec).unwrap();
    assert!(result.metadata.banner);
    let text = String::from_utf8_lossy(&output[..32]).into_owned();
    let (banner, _) = text.split_once('\n').unwrap();
    assert!(banner.starts_with("classcloak "), "unexpected banner {banner:?}");
    assert_eq!(&output[banner.len() + 1..banner.len() + 3], b"PK");
}
