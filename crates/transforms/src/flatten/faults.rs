//! Instruction sequences that always throw a known runtime exception. Each stage
//! of the dispatcher wraps one of them in a protected region whose handler is
//! the only way forward.

use classcloak_core::insn::{ArrayKind, FieldOp, Instruction, InvokeKind, Op, TypeOp};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// The runtime failures a stage can provoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Arithmetic,
    NullDereference,
    BadCast,
    ArrayBounds,
    NegativeSize,
    StringBounds,
    NumberFormat,
    IllegalState,
}

impl FaultKind {
    pub const ALL: [Self; 8] = [
        Self::Arithmetic,
        Self::NullDereference,
        Self::BadCast,
        Self::ArrayBounds,
        Self::NegativeSize,
        Self::StringBounds,
        Self::NumberFormat,
        Self::IllegalState,
    ];

    /// Draws `count` distinct kinds.
    pub fn pick(rng: &mut StdRng, count: usize) -> Vec<Self> {
        let mut kinds = Self::ALL.to_vec();
        kinds.shuffle(rng);
        kinds.truncate(count);
        kinds
    }

    /// Internal name of the exception the sequence raises.
    pub const fn catch_type(self) -> &'static str {
        match self {
            Self::Arithmetic => "java/lang/ArithmeticException",
            Self::NullDereference => "java/lang/NullPointerException",
            Self::BadCast => "java/lang/ClassCastException",
            Self::ArrayBounds => "java/lang/ArrayIndexOutOfBoundsException",
            Self::NegativeSize => "java/lang/NegativeArraySizeException",
            Self::StringBounds => "java/lang/StringIndexOutOfBoundsException",
            Self::NumberFormat => "java/lang/NumberFormatException",
            Self::IllegalState => "java/lang/IllegalStateException",
        }
    }

    /// One of three camouflage variants of the throwing sequence. Every variant
    /// starts and ends on an empty operand stack (if it were to complete).
    pub fn emit(self, rng: &mut StdRng) -> Vec<Instruction> {
        let variant = rng.random_range(0..3);
        let pop = Instruction::op(Op::Pop);
        match (self, variant) {
            (Self::Arithmetic, 0) => vec![
                Instruction::push_int(1),
                Instruction::push_int(0),
                Instruction::op(Op::IDiv),
                pop,
            ],
            (Self::Arithmetic, 1) => vec![
                Instruction::push_int(small_nonzero(rng)),
                Instruction::push_int(0),
                Instruction::op(Op::IRem),
                pop,
            ],
            (Self::Arithmetic, _) => vec![
                Instruction::push_int(rng.random()),
                Instruction::push_int(0),
                Instruction::op(Op::IDiv),
                pop,
            ],
            (Self::NullDereference, 0) => vec![
                Instruction::op(Op::AconstNull),
                Instruction::invoke_virtual("java/lang/Object", "hashCode", "()I"),
                pop,
            ],
            (Self::NullDereference, 1) => vec![
                Instruction::op(Op::AconstNull),
                Instruction::invoke_virtual("java/lang/Object", "toString", "()Ljava/lang/String;"),
                pop,
            ],
            (Self::NullDereference, _) => {
                vec![Instruction::op(Op::AconstNull), Instruction::op(Op::AThrow)]
            }
            (Self::BadCast, 0) => {
                let mut seq = construct("java/lang/Object");
                seq.extend([Instruction::type_op(TypeOp::CheckCast, "java/lang/Integer"), pop]);
                seq
            }
            (Self::BadCast, 1) => vec![
                Instruction::Field {
                    op: FieldOp::GetStatic,
                    owner: "java/lang/System".into(),
                    name: "out".into(),
                    desc: "Ljava/io/PrintStream;".into(),
                },
                Instruction::type_op(TypeOp::CheckCast, "java/lang/Integer"),
                pop,
            ],
            (Self::BadCast, _) => vec![
                Instruction::push_int(1),
                Instruction::invoke_static("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;"),
                Instruction::type_op(TypeOp::CheckCast, "java/lang/String"),
                pop,
            ],
            (Self::ArrayBounds, v) => {
                // length v, index v + 1
                let length = v;
                vec![
                    Instruction::push_int(length),
                    Instruction::NewArray(ArrayKind::Int),
                    Instruction::push_int(length + 1),
                    Instruction::op(Op::IaLoad),
                    pop,
                ]
            }
            (Self::NegativeSize, 0) => vec![
                Instruction::push_int(-1),
                Instruction::NewArray(ArrayKind::Int),
                pop,
            ],
            (Self::NegativeSize, 1) => vec![
                Instruction::push_int(-1),
                Instruction::NewArray(ArrayKind::Byte),
                pop,
            ],
            (Self::NegativeSize, _) => vec![
                Instruction::push_int(-1),
                Instruction::type_op(TypeOp::ANewArray, "java/lang/Object"),
                pop,
            ],
            (Self::StringBounds, 0) => {
                let mut seq = construct("java/lang/String");
                seq.extend([Instruction::push_int(0), char_at(), pop]);
                seq
            }
            (Self::StringBounds, 1) => vec![
                Instruction::type_op(TypeOp::New, "java/lang/String"),
                Instruction::op(Op::Dup),
                Instruction::push_int(1),
                Instruction::NewArray(ArrayKind::Char),
                Instruction::invoke_special("java/lang/String", "<init>", "([C)V"),
                Instruction::push_int(2),
                char_at(),
                pop,
            ],
            (Self::StringBounds, _) => {
                let mut seq = construct("java/lang/StringBuilder");
                seq.extend([
                    Instruction::invoke_virtual(
                        "java/lang/StringBuilder",
                        "toString",
                        "()Ljava/lang/String;",
                    ),
                    Instruction::push_int(1),
                    char_at(),
                    pop,
                ]);
                seq
            }
            (Self::NumberFormat, 0) => {
                let mut seq = construct("java/lang/String");
                seq.extend([parse_int(), pop]);
                seq
            }
            (Self::NumberFormat, 1) => {
                let mut seq = construct("java/lang/Object");
                seq.extend([
                    Instruction::invoke_virtual("java/lang/Object", "toString", "()Ljava/lang/String;"),
                    parse_int(),
                    pop,
                ]);
                seq
            }
            (Self::NumberFormat, _) => vec![
                Instruction::type_op(TypeOp::New, "java/lang/String"),
                Instruction::op(Op::Dup),
                Instruction::push_int(1),
                Instruction::NewArray(ArrayKind::Char),
                Instruction::op(Op::Dup),
                Instruction::push_int(0),
                Instruction::push_int(0),
                Instruction::op(Op::CaStore),
                Instruction::invoke_special("java/lang/String", "<init>", "([C)V"),
                parse_int(),
                pop,
            ],
            (Self::IllegalState, 0) => {
                let mut seq = construct(Self::IllegalState.catch_type());
                seq.push(Instruction::op(Op::AThrow));
                seq
            }
            (Self::IllegalState, 1) => {
                let mut seq = vec![Instruction::push_int(0), pop];
                seq.extend(construct(Self::IllegalState.catch_type()));
                seq.push(Instruction::op(Op::AThrow));
                seq
            }
            (Self::IllegalState, _) => {
                let mut seq = construct(Self::IllegalState.catch_type());
                seq.extend([
                    Instruction::op(Op::Dup),
                    pop,
                    Instruction::op(Op::AThrow),
                ]);
                seq
            }
        }
    }
}

/// `new T; dup; invokespecial T.<init>()V`
fn construct(ty: &str) -> Vec<Instruction> {
    vec![
        Instruction::type_op(TypeOp::New, ty),
        Instruction::op(Op::Dup),
        Instruction::Invoke {
            kind: InvokeKind::Special,
            owner: ty.to_string(),
            name: "<init>".into(),
            desc: "()V".into(),
            interface: false,
        },
    ]
}

fn char_at() -> Instruction {
    Instruction::invoke_virtual("java/lang/String", "charAt", "(I)C")
}

fn parse_int() -> Instruction {
    Instruction::invoke_static("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
}

/// A value in -4..=4 other than zero.
pub fn small_nonzero(rng: &mut StdRng) -> i32 {
    loop {
        let v = rng.random_range(-4..=4);
        if v != 0 {
            return v;
        }
    }
}
