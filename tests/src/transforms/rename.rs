use crate::fixtures::{base_derived, init_tracing, keep_example, method, public_static, runnable_task};
use classcloak_core::insn::{Instruction, Op};
use classcloak_core::keep::KeepRules;
use classcloak_core::{AccessFlags, OBJECT, Program, ProgramBundle, TypeDef};
use classcloak_transform::class_rename::ClassRename;
use classcloak_transform::method_rename::MethodRename;
use classcloak_transform::obfuscator::all_transforms;
use classcloak_transform::{PassConfig, Transform, pass};
use classcloak_verification::{Arg, Call, Observed, Termination, VerificationConfig, execute};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;

fn config(keep: &str) -> PassConfig {
    PassConfig {
        keep: KeepRules::parse_list(keep),
        ..PassConfig::default()
    }
}

fn apply(program: Program, pass: &dyn Transform, seed: u64) -> Program {
    let mut bundle = ProgramBundle::new(program, Default::default());
    let mut rng = StdRng::seed_from_u64(seed);
    pass.apply(&mut bundle, &mut rng).unwrap();
    bundle.program
}

fn probe(program: &Program) -> Termination {
    let call = Call::static_method("app/Probe", "probe", "()I", Vec::new());
    execute(program, &call, &VerificationConfig::development())
        .unwrap()
        .termination
}

fn method_names(ty: &TypeDef) -> Vec<&str> {
    ty.methods.iter().map(|m| m.name.as_str()).collect()
}

#[test]
fn overriding_methods_share_a_new_name() {
    init_tracing();
    let renamed = apply(base_derived(), &MethodRename::new(config("app.Probe")), 42);

    let base = renamed.get("app/Base").unwrap();
    let derived = renamed.get("app/Derived").unwrap();
    let base_f = &base.methods[1];
    let derived_f = &derived.methods[1];
    assert_ne!(base_f.name, "f", "Base.f should be renamed");
    assert_eq!(base_f.name, derived_f.name, "override group must share one name");
    assert_eq!(base.methods[0].name, "<init>");

    assert_eq!(probe(&renamed), Termination::Returned(Observed::Int(2)));
}

#[test]
fn full_pipeline_keeps_virtual_dispatch() {
    for seed in 0..20 {
        let mut bundle = ProgramBundle::new(base_derived(), Default::default());
        let cfg = config("app.Probe");
        let mut rng = StdRng::seed_from_u64(seed);
        pass::run(&mut bundle, &all_transforms(&cfg), &cfg, &mut rng).unwrap();

        let program = &bundle.program;
        assert!(!program.contains("app/Base") && !program.contains("app/Derived"));
        let derived = program
            .types()
            .find(|t| t.super_name.as_deref().is_some_and(|s| program.contains(s)))
            .expect("subclass survives renaming");
        let base = program.get(derived.super_name.as_deref().unwrap()).unwrap();
        assert_eq!(base.super_name.as_deref(), Some(OBJECT));
        assert_eq!(base.methods[1].name, derived.methods[1].name);

        assert_eq!(probe(program), Termination::Returned(Observed::Int(2)), "seed {seed}");
    }
}

#[test]
fn keep_rule_protects_only_the_named_type() {
    let renamed = apply(keep_example(), &ClassRename::new(config("pkg.Public")), 7);
    assert!(renamed.contains("pkg/Public"));
    assert!(!renamed.contains("pkg/Internal"));
    assert_eq!(renamed.len(), 2);
    let fresh: Vec<&str> = renamed.names().filter(|n| *n != "pkg/Public").collect();
    assert_eq!(fresh.len(), 1);
    assert_ne!(fresh[0], "pkg/Public");

    let methods = apply(keep_example(), &MethodRename::new(config("pkg.Public")), 7);
    assert_eq!(method_names(methods.get("pkg/Public").unwrap()), vec!["<init>", "value"]);
    assert_ne!(method_names(methods.get("pkg/Internal").unwrap())[1], "value");
}

#[test]
fn external_ancestors_pin_their_overrides() {
    let original = runnable_task();
    let renamed = apply(original.clone(), &MethodRename::new(PassConfig::default()), 3);
    let task = renamed.get("app/Task").unwrap();
    let names = method_names(task);
    assert_eq!(names[1], "run", "Runnable.run is external and must keep its name");
    assert_ne!(names[2], "helper", "helper overrides nothing outside the program");

    let call = Call::instance_method("app/Task", "run", "()V", Vec::new());
    let cfg = VerificationConfig::development();
    let before = execute(&original, &call, &cfg).unwrap();
    let after = execute(&renamed, &call, &cfg).unwrap();
    assert_eq!(before.output, vec!["9"]);
    assert_eq!(before, after);
}

#[test]
fn generated_names_never_collide() {
    let mut many = TypeDef::new("app/Many");
    for i in 0..40 {
        many.methods.push(method(
            &format!("m{i}"),
            "(I)I",
            public_static(),
            1,
            vec![Instruction::push_int(i), Instruction::op(Op::IReturn)],
        ));
    }
    let mut types = vec![many];
    types.extend((0..60).map(|i| TypeDef::new(format!("app/sub/T{i}"))));
    let program: Program = types.into_iter().collect();

    let methods = apply(program.clone(), &MethodRename::new(config("app.Many.m0")), 5);
    let many = methods.get("app/Many").unwrap();
    let unique: HashSet<&str> = many.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(unique.len(), 40);
    assert_eq!(many.methods[0].name, "m0");

    let cfg = VerificationConfig::development();
    for i in [0, 17, 39] {
        let name = many.methods[i].name.clone();
        let call = Call::static_method("app/Many", &name, "(I)I", vec![Arg::Int(0)]);
        let outcome = execute(&methods, &call, &cfg).unwrap();
        assert_eq!(outcome.termination, Termination::Returned(Observed::Int(i as i32)));
    }

    let classes = apply(program, &ClassRename::new(PassConfig::default()), 5);
    assert_eq!(classes.len(), 101);
    assert!(classes.names().all(|n| !n.starts_with("app/")));
}

fn static_returning(name: &str, value: i32) -> classcloak_core::program::MethodDef {
    method(
        name,
        "()I",
        public_static(),
        0,
        vec![Instruction::push_int(value), Instruction::op(Op::IReturn)],
    )
}

#[test]
fn kept_subtype_keeps_a_shadowing_static() {
    let mut base = TypeDef::new("app/Base");
    base.methods.push(static_returning("s", 1));
    let mut kept = TypeDef::new("app/Kept");
    kept.super_name = Some("app/Base".into());
    kept.methods.push(static_returning("s", 2));
    let mut probe_ty = TypeDef::new("app/Probe");
    probe_ty.methods.push(method(
        "probe",
        "()I",
        public_static(),
        0,
        vec![
            Instruction::invoke_static("app/Kept", "s", "()I"),
            Instruction::invoke_static("app/Base", "s", "()I"),
            Instruction::op(Op::IAdd),
            Instruction::op(Op::IReturn),
        ],
    ));
    let program: Program = [base, kept, probe_ty].into_iter().collect();

    let renamed = apply(program, &MethodRename::new(config("app.Kept,app.Probe")), 9);
    assert_eq!(method_names(renamed.get("app/Kept").unwrap()), vec!["s"]);
    let base_name = &renamed.get("app/Base").unwrap().methods[0].name;
    assert_ne!(base_name, "s");

    let body = &renamed.get("app/Probe").unwrap().methods[0].instructions;
    let Instruction::Invoke { owner, name, .. } = &body[0] else {
        panic!("expected an invocation, found {:?}", body[0]);
    };
    assert_eq!((owner.as_str(), name.as_str()), ("app/Kept", "s"));
    let Instruction::Invoke { name, .. } = &body[1] else {
        panic!("expected an invocation, found {:?}", body[1]);
    };
    assert_eq!(name, base_name);

    assert_eq!(probe(&renamed), Termination::Returned(Observed::Int(3)));
}

#[test]
fn platform_overrides_beyond_run_keep_their_names() {
    let void = |name: &str| {
        method(name, "()V", AccessFlags::PUBLIC, 1, vec![Instruction::op(Op::Return)])
    };
    let mut worker = TypeDef::new("app/Worker");
    worker.super_name = Some("java/lang/Thread".into());
    worker.methods.push(void("start"));
    worker.methods.push(void("poll"));

    let mut oops = TypeDef::new("app/Oops");
    oops.super_name = Some("java/lang/RuntimeException".into());
    oops.methods.push(method(
        "getStackTrace",
        "()[Ljava/lang/StackTraceElement;",
        AccessFlags::PUBLIC,
        1,
        vec![Instruction::op(Op::AconstNull), Instruction::op(Op::AReturn)],
    ));
    oops.methods.push(method(
        "printStackTrace",
        "(Ljava/io/PrintStream;)V",
        AccessFlags::PUBLIC,
        2,
        vec![Instruction::op(Op::Return)],
    ));
    oops.methods.push(void("code"));
    let program: Program = [worker, oops].into_iter().collect();

    let renamed = apply(program, &MethodRename::new(PassConfig::default()), 13);
    let worker = method_names(renamed.get("app/Worker").unwrap());
    assert_eq!(worker, vec!["start", "poll"], "Thread is only partly modelled");
    let oops = method_names(renamed.get("app/Oops").unwrap());
    assert_eq!(&oops[..2], ["getStackTrace", "printStackTrace"]);
    assert_ne!(oops[2], "code", "code overrides nothing in Throwable");
}
