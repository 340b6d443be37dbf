//! Small programs shared by the integration tests.

use classcloak_core::archive::{Archive, WriteOptions};
use classcloak_core::codec::JsonCodec;
use classcloak_core::insn::{Constant, FieldOp, Instruction, JumpCond, Op, TypeOp, VarOp};
use classcloak_core::manifest::{MAIN_CLASS, Manifest};
use classcloak_core::program::{ExceptionRegion, FieldDef, MethodDef};
use classcloak_core::{AccessFlags, Label, OBJECT, Program, ProgramBundle, TypeDef};

pub(crate) const PRINT_STREAM: &str = "java/io/PrintStream";

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub(crate) fn method(
    name: &str,
    desc: &str,
    access: AccessFlags,
    max_locals: u16,
    instructions: Vec<Instruction>,
) -> MethodDef {
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

pub(crate) fn public_static() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::STATIC
}

pub(crate) fn constructor(super_name: &str) -> MethodDef {
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

pub(crate) fn system_out() -> Instruction {
    Instruction::Field {
        op: FieldOp::GetStatic,
        owner: "java/lang/System".into(),
        name: "out".into(),
        desc: "Ljava/io/PrintStream;".into(),
    }
}

/// `static int sum()`: adds 1..=10 in a loop and returns 55.
pub(crate) fn sum_method() -> MethodDef {
    method(
        "sum",
        "()I",
        public_static(),
        2,
        vec![
            Instruction::push_int(0),
            Instruction::load(VarOp::IStore, 0),
            Instruction::push_int(1),
            Instruction::load(VarOp::IStore, 1),
            Instruction::Label(Label(0)),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::push_int(10),
            Instruction::jump(JumpCond::IfICmpGt, Label(1)),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::op(Op::IAdd),
            Instruction::load(VarOp::IStore, 0),
            Instruction::Iinc { slot: 1, delta: 1 },
            Instruction::goto(Label(0)),
            Instruction::Label(Label(1)),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::op(Op::IReturn),
        ],
    )
}

/// `static int checked(int x)`: throws IllegalArgumentException for negative
/// input, otherwise returns `2x + 1`.
pub(crate) fn checked_method() -> MethodDef {
    let iae = "java/lang/IllegalArgumentException";
    method(
        "checked",
        "(I)I",
        public_static(),
        2,
        vec![
            Instruction::load(VarOp::ILoad, 0),
            Instruction::jump(JumpCond::IfGe, Label(0)),
            Instruction::type_op(TypeOp::New, iae),
            Instruction::op(Op::Dup),
            Instruction::Const(Constant::String("negative".into())),
            Instruction::invoke_special(iae, "<init>", "(Ljava/lang/String;)V"),
            Instruction::op(Op::AThrow),
            Instruction::Label(Label(0)),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::push_int(2),
            Instruction::op(Op::IMul),
            Instruction::load(VarOp::IStore, 1),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::push_int(1),
            Instruction::op(Op::IAdd),
            Instruction::op(Op::IReturn),
        ],
    )
}

/// `static int safe(int x)`: `100 / x + 2x`, or 0 when the division throws.
pub(crate) fn safe_method() -> MethodDef {
    let mut m = method(
        "safe",
        "(I)I",
        public_static(),
        2,
        vec![
            Instruction::Label(Label(0)),
            Instruction::push_int(100),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::op(Op::IDiv),
            Instruction::load(VarOp::IStore, 1),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::push_int(2),
            Instruction::op(Op::IMul),
            Instruction::op(Op::IAdd),
            Instruction::load(VarOp::IStore, 1),
            Instruction::Label(Label(1)),
            Instruction::load(VarOp::ILoad, 1),
            Instruction::op(Op::IReturn),
            Instruction::Label(Label(2)),
            Instruction::op(Op::Pop),
            Instruction::push_int(0),
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

/// `static void report(int x)`: prints a header and `x`, bumps the static
/// counter and prints it.
pub(crate) fn report_method(owner: &str) -> MethodDef {
    let count = |op| Instruction::Field {
        op,
        owner: owner.into(),
        name: "count".into(),
        desc: "I".into(),
    };
    method(
        "report",
        "(I)V",
        public_static(),
        1,
        vec![
            system_out(),
            Instruction::Const(Constant::String("value".into())),
            Instruction::invoke_virtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V"),
            system_out(),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::invoke_virtual(PRINT_STREAM, "println", "(I)V"),
            count(FieldOp::GetStatic),
            Instruction::push_int(1),
            Instruction::op(Op::IAdd),
            count(FieldOp::PutStatic),
            system_out(),
            count(FieldOp::GetStatic),
            Instruction::invoke_virtual(PRINT_STREAM, "println", "(I)V"),
            Instruction::op(Op::Return),
        ],
    )
}

/// `app/Calc` with `sum`, `checked` and `report`.
pub(crate) fn calc_type() -> TypeDef {
    let mut ty = TypeDef::new("app/Calc");
    ty.fields.push(FieldDef {
        name: "count".into(),
        desc: "I".into(),
        access: AccessFlags::PRIVATE | AccessFlags::STATIC,
    });
    ty.methods.push(sum_method());
    ty.methods.push(checked_method());
    ty.methods.push(report_method("app/Calc"));
    ty
}

fn returns(name: &str, value: i32) -> MethodDef {
    method(
        name,
        "()I",
        AccessFlags::PUBLIC,
        1,
        vec![Instruction::push_int(value), Instruction::op(Op::IReturn)],
    )
}

/// `Base.f() = 1`, `Derived extends Base`, `Derived.f() = 2`, and
/// `app/Probe.probe()` calling `f` through a `Base`-typed reference to a new
/// `Derived`.
pub(crate) fn base_derived() -> Program {
    let mut base = TypeDef::new("app/Base");
    base.methods.push(constructor(OBJECT));
    base.methods.push(returns("f", 1));

    let mut derived = TypeDef::new("app/Derived");
    derived.super_name = Some("app/Base".into());
    derived.methods.push(constructor("app/Base"));
    derived.methods.push(returns("f", 2));

    let mut probe = TypeDef::new("app/Probe");
    probe.methods.push(method(
        "probe",
        "()I",
        public_static(),
        0,
        vec![
            Instruction::type_op(TypeOp::New, "app/Derived"),
            Instruction::op(Op::Dup),
            Instruction::invoke_special("app/Derived", "<init>", "()V"),
            Instruction::invoke_virtual("app/Base", "f", "()I"),
            Instruction::op(Op::IReturn),
        ],
    ));
    [base, derived, probe].into_iter().collect()
}

/// `pkg/Public` and `pkg/Internal`, each with one method.
pub(crate) fn keep_example() -> Program {
    let mut public = TypeDef::new("pkg/Public");
    public.methods.push(constructor(OBJECT));
    public.methods.push(returns("value", 3));
    let mut internal = TypeDef::new("pkg/Internal");
    internal.methods.push(constructor(OBJECT));
    internal.methods.push(returns("value", 4));
    [public, internal].into_iter().collect()
}

/// `app/Task implements java/lang/Runnable` with `run` printing a line and a
/// private helper.
pub(crate) fn runnable_task() -> Program {
    let mut task = TypeDef::new("app/Task");
    task.interfaces.push("java/lang/Runnable".into());
    task.methods.push(constructor(OBJECT));
    task.methods.push(method(
        "run",
        "()V",
        AccessFlags::PUBLIC,
        1,
        vec![
            system_out(),
            Instruction::load(VarOp::ALoad, 0),
            Instruction::invoke_virtual("app/Task", "helper", "()I"),
            Instruction::invoke_virtual(PRINT_STREAM, "println", "(I)V"),
            Instruction::op(Op::Return),
        ],
    ));
    task.methods.push(returns("helper", 9));
    std::iter::once(task).collect()
}

/// `app/Main.main` printing `Calc.sum()` and running `Calc.report(7)`.
pub(crate) fn main_type() -> TypeDef {
    let mut main = TypeDef::new("app/Main");
    main.methods.push(method(
        "main",
        "([Ljava/lang/String;)V",
        public_static(),
        1,
        vec![
            system_out(),
            Instruction::invoke_static("app/Calc", "sum", "()I"),
            Instruction::invoke_virtual(PRINT_STREAM, "println", "(I)V"),
            Instruction::push_int(7),
            Instruction::invoke_static("app/Calc", "report", "(I)V"),
            Instruction::op(Op::Return),
        ],
    ));
    main
}

/// A runnable archive: `app/Main`, `app/Calc`, a manifest naming the entry
/// point, and one resource.
pub(crate) fn app_archive() -> Vec<u8> {
    let mut manifest = Manifest::new();
    manifest.set("Created-By", "fixtures");
    manifest.set(MAIN_CLASS, "app.Main");
    let archive = Archive {
        bundle: ProgramBundle::new([main_type(), calc_type()].into_iter().collect(), manifest),
        resources: [("assets/readme.txt".to_string(), b"hello".to_vec())]
            .into_iter()
            .collect(),
    };
    archive
        .write(&JsonCodec, &WriteOptions::default())
        .unwrap()
}
