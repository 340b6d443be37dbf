use super::*;
use classcloak_core::insn::{JumpCond, VarOp};
use classcloak_core::program::ExceptionRegion;
use classcloak_core::{AccessFlags, ProgramBundle};
use classcloak_transform::flatten::FlowObfuscation;
use classcloak_transform::{PassConfig, Transform};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn method(name: &str, desc: &str, access: AccessFlags, max_locals: u16, instructions: Vec<Instruction>) -> MethodDef {
    MethodDef {
        name: name.into(),
        desc: desc.into(),
        access,
        max_locals,
        max_stack: 4,
        instructions,
        exception_regions: Vec::new(),
    }
}

fn public_static() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::STATIC
}

/// `aload_0; invokespecial super.<init>()V; return`
fn constructor(super_name: &str) -> MethodDef {
    method(
        "<init>",
        "()V",
        AccessFlags::PUBLIC,
        1,
        vec![
            Instruction::load(VarOp::ALoad, 0),
            Instruction::invoke_special(super_name, "<init>", "()V"),
            Instruction::op(Op::Return),
        ],
    )
}

/// Sum of 1..=n for the int argument n.
fn sum_to() -> MethodDef {
    method(
        "sumTo",
        "(I)I",
        public_static(),
        3,
        vec![
            Instruction::push_int(0),
            Instruction::load(VarOp::IStore, 1),
            Instruction::push_int(1),
            Instruction::load(VarOp::IStore, 2),
            Instruction::Label(Label(0)),
            Instruction::load(VarOp::ILoad, 2),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::jump(JumpCond::IfICmpGt, Label(1)),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::load(VarOp::ILoad, 2),
            Instruction::op(Op::IAdd),
            Instruction::load(VarOp::IStore, 1),
            Instruction::Iinc { slot: 2, delta: 1 },
            Instruction::goto(Label(0)),
            Instruction::Label(Label(1)),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::op(Op::IReturn),
        ],
    )
}

/// `try { return 10 / d; } catch (ArithmeticException e) { return -1; }`
fn guarded_divide() -> MethodDef {
    let mut m = method(
        "divide",
        "(I)I",
        public_static(),
        2,
        vec![
            Instruction::Label(Label(0)),
            Instruction::push_int(10),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::op(Op::IDiv),
            Instruction::op(Op::IReturn),
            Instruction::Label(Label(1)),
            Instruction::Label(Label(2)),
            Instruction::load(VarOp::AStore, 1),
            Instruction::push_int(-1),
            Instruction::op(Op::IReturn),
        ],
    );
    m.exception_regions.push(ExceptionRegion {
        start: Label(0),
        end: Label(1),
        handler: Label(2),
        catch_type: Some("java/lang/ArithmeticException".into()),
    });
    m
}

fn calc_program() -> Program {
    let mut ty = TypeDef::new("app/Calc");
    ty.methods.push(sum_to());
    ty.methods.push(guarded_divide());
    std::iter::once(ty).collect()
}

fn returned(outcome: &Outcome) -> &Observed {
    match &outcome.termination {
        Termination::Returned(v) => v,
        other => panic!("expected a return, got {other:?}"),
    }
}

#[test]
fn loops_and_arithmetic() {
    let program = calc_program();
    let config = VerificationConfig::development();
    let call = Call::static_method("app/Calc", "sumTo", "(I)I", vec![Arg::Int(10)]);
    let outcome = execute(&program, &call, &config).unwrap();
    assert_eq!(returned(&outcome), &Observed::Int(55));
    assert!(outcome.output.is_empty());
}

#[test]
fn handler_catches_matching_exception() {
    let program = calc_program();
    let config = VerificationConfig::development();
    let ok = Call::static_method("app/Calc", "divide", "(I)I", vec![Arg::Int(3)]);
    let zero = Call::static_method("app/Calc", "divide", "(I)I", vec![Arg::Int(0)]);
    assert_eq!(returned(&execute(&program, &ok, &config).unwrap()), &Observed::Int(3));
    assert_eq!(returned(&execute(&program, &zero, &config).unwrap()), &Observed::Int(-1));
}

#[test]
fn uncaught_exception_terminates_the_run() {
    let mut ty = TypeDef::new("app/Boom");
    ty.methods.push(method(
        "run",
        "()V",
        public_static(),
        0,
        vec![
            Instruction::type_op(TypeOp::New, "java/lang/IllegalStateException"),
            Instruction::op(Op::Dup),
            Instruction::Const(Constant::String("bad".into())),
            Instruction::invoke_special("java/lang/IllegalStateException", "<init>", "(Ljava/lang/String;)V"),
            Instruction::op(Op::AThrow),
        ],
    ));
    let program: Program = std::iter::once(ty).collect();
    let outcome = execute(
        &program,
        &Call::static_method("app/Boom", "run", "()V", Vec::new()),
        &VerificationConfig::development(),
    )
    .unwrap();
    assert_eq!(
        outcome.termination,
        Termination::Threw("java/lang/IllegalStateException".into())
    );
}

#[test]
fn virtual_calls_dispatch_on_runtime_type() {
    let value = |n| {
        method(
            "value",
            "()I",
            AccessFlags::PUBLIC,
            1,
            vec![Instruction::push_int(n), Instruction::op(Op::IReturn)],
        )
    };
    let mut base = TypeDef::new("app/Base");
    base.methods.push(constructor(OBJECT));
    base.methods.push(value(1));
    let mut derived = TypeDef::new("app/Derived");
    derived.super_name = Some("app/Base".into());
    derived.methods.push(constructor("app/Base"));
    derived.methods.push(value(2));

    // Main prints Base.value() through a Base-typed call on a Derived object.
    let mut main = TypeDef::new("app/Main");
    main.methods.push(method(
        "main",
        "([Ljava/lang/String;)V",
        public_static(),
        1,
        vec![
            Instruction::Field {
                op: FieldOp::GetStatic,
                owner: "java/lang/System".into(),
                name: "out".into(),
                desc: "Ljava/io/PrintStream;".into(),
            },
            Instruction::type_op(TypeOp::New, "app/Derived"),
            Instruction::op(Op::Dup),
            Instruction::invoke_special("app/Derived", "<init>", "()V"),
            Instruction::invoke_virtual("app/Base", "value", "()I"),
            Instruction::invoke_virtual("java/io/PrintStream", "println", "(I)V"),
            Instruction::op(Op::Return),
        ],
    ));
    let program: Program = [base, derived, main].into_iter().collect();
    let config = VerificationConfig::development();

    let base_call = Call::instance_method("app/Base", "value", "()I", Vec::new());
    let derived_call = Call::instance_method("app/Derived", "value", "()I", Vec::new());
    assert_eq!(returned(&execute(&program, &base_call, &config).unwrap()), &Observed::Int(1));
    assert_eq!(returned(&execute(&program, &derived_call, &config).unwrap()), &Observed::Int(2));

    let outcome = execute(&program, &Call::Main { class: "app/Main".into() }, &config).unwrap();
    assert_eq!(outcome.output, vec!["2".to_string()]);
    assert_eq!(outcome.termination, Termination::Returned(Observed::Void));
}

#[test]
fn static_initializer_runs_once() {
    let mut ty = TypeDef::new("app/Counter");
    let field = |op| Instruction::Field {
        op,
        owner: "app/Counter".into(),
        name: "n".into(),
        desc: "I".into(),
    };
    ty.fields.push(classcloak_core::program::FieldDef {
        name: "n".into(),
        desc: "I".into(),
        access: AccessFlags::STATIC,
    });
    ty.methods.push(method(
        "<clinit>",
        "()V",
        AccessFlags::STATIC,
        0,
        vec![Instruction::push_int(40), field(FieldOp::PutStatic), Instruction::op(Op::Return)],
    ));
    ty.methods.push(method(
        "next",
        "()I",
        public_static(),
        0,
        vec![
            field(FieldOp::GetStatic),
            Instruction::push_int(1),
            Instruction::op(Op::IAdd),
            Instruction::op(Op::Dup),
            field(FieldOp::PutStatic),
            Instruction::op(Op::IReturn),
        ],
    ));
    ty.methods.push(method(
        "twice",
        "()I",
        public_static(),
        0,
        vec![
            Instruction::invoke_static("app/Counter", "next", "()I"),
            Instruction::op(Op::Pop),
            Instruction::invoke_static("app/Counter", "next", "()I"),
            Instruction::op(Op::IReturn),
        ],
    ));
    let program: Program = std::iter::once(ty).collect();
    let outcome = execute(
        &program,
        &Call::static_method("app/Counter", "twice", "()I", Vec::new()),
        &VerificationConfig::development(),
    )
    .unwrap();
    assert_eq!(returned(&outcome), &Observed::Int(42));
}

#[test]
fn step_limit_stops_endless_loops() {
    let mut ty = TypeDef::new("app/Spin");
    ty.methods.push(method(
        "spin",
        "()V",
        public_static(),
        0,
        vec![Instruction::Label(Label(0)), Instruction::goto(Label(0))],
    ));
    let program: Program = std::iter::once(ty).collect();
    let mut config = VerificationConfig::development();
    config.step_limit = 500;
    let err = execute(&program, &Call::static_method("app/Spin", "spin", "()V", Vec::new()), &config)
        .unwrap_err();
    assert!(matches!(err, VerificationError::StepLimit(500)), "got {err}");
}

#[test]
fn missing_entry_point_is_an_error() {
    let err = execute(
        &calc_program(),
        &Call::static_method("app/Calc", "nope", "()V", Vec::new()),
        &VerificationConfig::development(),
    )
    .unwrap_err();
    assert!(matches!(err, VerificationError::NoSuchMethod { .. }));
}

#[test]
fn flattened_methods_keep_their_results() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let original = calc_program();
    let config = VerificationConfig::development();
    let pass = FlowObfuscation::new(PassConfig::default());
    let calls: Vec<Call> = [0, 1, 10, 100]
        .into_iter()
        .map(|n| Call::static_method("app/Calc", "sumTo", "(I)I", vec![Arg::Int(n)]))
        .chain(
            [4, 0].into_iter().map(|d| Call::static_method("app/Calc", "divide", "(I)I", vec![Arg::Int(d)])),
        )
        .collect();

    for seed in 0..32 {
        let mut bundle = ProgramBundle::new(original.clone(), Default::default());
        let mut rng = StdRng::seed_from_u64(seed);
        assert!(pass.apply(&mut bundle, &mut rng).unwrap(), "seed {seed} left sumTo alone");
        for call in &calls {
            let want = execute(&original, call, &config).unwrap();
            let got = execute(&bundle.program, call, &config).unwrap();
            assert_eq!(want, got, "seed {seed} changed {call:?}");
        }
    }
}
