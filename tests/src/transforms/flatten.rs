use crate::fixtures::{calc_type, init_tracing, safe_method, sum_method};
use classcloak_core::insn::Instruction;
use classcloak_core::validate::validate_method;
use classcloak_core::{Label, Program, ProgramBundle, TypeDef};
use classcloak_transform::flatten::FlowObfuscation;
use classcloak_transform::{PassConfig, Transform};
use classcloak_verification::{
    Arg, Call, Observed, PracticalTester, TestCase, Termination, VerificationConfig, execute,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

fn flatten(program: &Program, seed: u64) -> Program {
    let mut bundle = ProgramBundle::new(program.clone(), Default::default());
    let mut rng = StdRng::seed_from_u64(seed);
    let pass = FlowObfuscation::new(PassConfig::default());
    assert!(pass.apply(&mut bundle, &mut rng).unwrap(), "seed {seed} flattened nothing");
    bundle.program
}

#[test]
fn sum_survives_a_thousand_seeds() {
    init_tracing();
    let mut ty = TypeDef::new("app/Calc");
    ty.methods.push(sum_method());
    let program: Program = std::iter::once(ty).collect();
    let call = Call::static_method("app/Calc", "sum", "()I", Vec::new());
    let config = VerificationConfig::comprehensive();

    for seed in 0..1000 {
        let flattened = flatten(&program, seed);
        let outcome = execute(&flattened, &call, &config)
            .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
        assert_eq!(
            outcome.termination,
            Termination::Returned(Observed::Int(55)),
            "seed {seed}"
        );
        assert!(outcome.output.is_empty(), "seed {seed} printed {:?}", outcome.output);
    }
}

#[test]
fn every_clock_reaches_the_original_body() {
    let mut ty = TypeDef::new("app/Calc");
    ty.methods.push(sum_method());
    ty.methods.push(safe_method());
    let program: Program = std::iter::once(ty).collect();
    let calls = [
        (Call::static_method("app/Calc", "sum", "()I", Vec::new()), 55),
        (Call::static_method("app/Calc", "safe", "(I)I", vec![Arg::Int(0)]), 0),
        (Call::static_method("app/Calc", "safe", "(I)I", vec![Arg::Int(5)]), 30),
        (Call::static_method("app/Calc", "safe", "(I)I", vec![Arg::Int(-4)]), -33),
    ];
    let starts = [0, 1_000_000, -42, 81_985_529_216_486_895, i64::MAX];

    for seed in 0..400 {
        let flattened = flatten(&program, seed);
        for start in starts {
            let config = VerificationConfig {
                nano_time_start: start,
                ..VerificationConfig::development()
            };
            for (call, want) in &calls {
                let outcome = execute(&flattened, call, &config)
                    .unwrap_or_else(|e| panic!("seed {seed} start {start} {call:?}: {e}"));
                assert_eq!(
                    outcome.termination,
                    Termination::Returned(Observed::Int(*want)),
                    "seed {seed} start {start} {call:?}"
                );
            }
        }
    }
}

#[test]
fn exceptions_and_side_effects_are_preserved() {
    let program: Program = std::iter::once(calc_type()).collect();
    let checked = |x| TestCase::same(Call::static_method("app/Calc", "checked", "(I)I", vec![Arg::Int(x)]));
    let cases = vec![
        checked(-3),
        checked(0),
        checked(20),
        TestCase::same(Call::static_method("app/Calc", "report", "(I)V", vec![Arg::Int(7)])),
    ];

    let mut config = VerificationConfig::standard();
    config.seed_count = 150;
    let tester = PracticalTester::new(config).unwrap();
    let results = tester
        .sweep(&program, &cases, |seed| {
            let mut bundle = ProgramBundle::new(program.clone(), Default::default());
            let mut rng = StdRng::seed_from_u64(seed);
            FlowObfuscation::new(PassConfig::default())
                .apply(&mut bundle, &mut rng)
                .map(|_| bundle.program)
        })
        .unwrap();

    assert!(results.overall_passed, "mismatches: {:#?}", results.mismatches);
    assert_eq!(results.seeds_tried, 150);
    assert_eq!(results.cases_executed, 150 * cases.len());

    let thrown = execute(&program, &cases[0].original, tester.config()).unwrap();
    assert_eq!(
        thrown.termination,
        Termination::Threw("java/lang/IllegalArgumentException".into())
    );
}

#[test]
fn dispatch_is_well_formed() {
    let program: Program = std::iter::once(calc_type()).collect();
    for seed in 0..200 {
        let flattened = flatten(&program, seed);
        let ty = flattened.get("app/Calc").unwrap();
        for method in ty.methods.iter().filter(|m| m.has_body()) {
            let context = format!("{}{} (seed {seed})", method.name, method.desc);
            validate_method(method, &context).unwrap();

            let mut placed: HashMap<Label, usize> = HashMap::new();
            for insn in &method.instructions {
                if let Instruction::Label(l) = insn {
                    *placed.entry(*l).or_default() += 1;
                }
            }
            let referenced = method
                .instructions
                .iter()
                .flat_map(Instruction::targets)
                .chain(
                    method
                        .exception_regions
                        .iter()
                        .flat_map(|r| [r.start, r.end, r.handler]),
                );
            for label in referenced {
                assert_eq!(placed.get(&label), Some(&1), "{context}: label {label:?}");
            }

            let switches = method
                .instructions
                .iter()
                .filter(|i| matches!(i, Instruction::LookupSwitch { .. }))
                .count();
            assert!(switches >= 1, "{context}: no dispatch switch");
        }
    }
}
