//! Instruction model: a tagged union over the operation classes of a method body,
//! with inline label markers resolved to offsets only by a codec.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque jump target, unique within one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Operations without operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Nop,
    AconstNull,
    // array element access
    IaLoad,
    LaLoad,
    FaLoad,
    DaLoad,
    AaLoad,
    BaLoad,
    CaLoad,
    SaLoad,
    IaStore,
    LaStore,
    FaStore,
    DaStore,
    AaStore,
    BaStore,
    CaStore,
    SaStore,
    // stack
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    // arithmetic
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    IShl,
    LShl,
    IShr,
    LShr,
    IUShr,
    LUShr,
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    // conversions
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    // comparisons
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
    // returns
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    ArrayLength,
    AThrow,
    MonitorEnter,
    MonitorExit,
}

impl Op {
    /// Instructions after which control never falls through.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::IReturn
                | Self::LReturn
                | Self::FReturn
                | Self::DReturn
                | Self::AReturn
                | Self::Return
                | Self::AThrow
        )
    }
}

/// Local-slot load/store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarOp {
    ILoad,
    LLoad,
    FLoad,
    DLoad,
    ALoad,
    IStore,
    LStore,
    FStore,
    DStore,
    AStore,
}

impl VarOp {
    pub const fn is_store(self) -> bool {
        matches!(
            self,
            Self::IStore | Self::LStore | Self::FStore | Self::DStore | Self::AStore
        )
    }

    pub const fn is_wide(self) -> bool {
        matches!(self, Self::LLoad | Self::DLoad | Self::LStore | Self::DStore)
    }
}

/// Operations taking a single type operand (an internal name or, for arrays, a descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeOp {
    New,
    ANewArray,
    CheckCast,
    InstanceOf,
}

/// Element type of a primitive array allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayKind {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

/// Condition of a jump. `Goto` is unconditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpCond {
    Goto,
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfICmpEq,
    IfICmpNe,
    IfICmpLt,
    IfICmpGe,
    IfICmpGt,
    IfICmpLe,
    IfACmpEq,
    IfACmpNe,
    IfNull,
    IfNonNull,
}

/// A method handle constant or bootstrap reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    /// Reference kind, 1..=9 in class-file terms.
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub interface: bool,
}

/// Loadable constant values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Type literal: internal name, or descriptor for array types.
    Type(String),
    MethodType(String),
    Handle(Handle),
}

impl Constant {
    /// Whether the constant occupies two stack slots.
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// One instruction of a method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Simple(Op),
    Var {
        op: VarOp,
        slot: u16,
    },
    Iinc {
        slot: u16,
        delta: i16,
    },
    Const(Constant),
    Type {
        op: TypeOp,
        ty: String,
    },
    NewArray(ArrayKind),
    MultiANewArray {
        desc: String,
        dims: u8,
    },
    Field {
        op: FieldOp,
        owner: String,
        name: String,
        desc: String,
    },
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        desc: String,
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        desc: String,
        bootstrap: Handle,
        args: Vec<Constant>,
    },
    Jump {
        cond: JumpCond,
        target: Label,
    },
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },
    /// Legacy subroutine call.
    Jsr(Label),
    /// Legacy subroutine return through a local slot.
    Ret(u16),
    /// Inline marker, not an executable instruction.
    Label(Label),
}

impl Instruction {
    /// Lowest class-file major version able to carry this instruction.
    pub const fn min_version(&self) -> u16 {
        match self {
            Self::InvokeDynamic { .. }
            | Self::Const(Constant::MethodType(_) | Constant::Handle(_)) => 51,
            Self::Const(Constant::Type(_)) => 49,
            _ => 45,
        }
    }

    pub const fn op(op: Op) -> Self {
        Self::Simple(op)
    }

    pub const fn load(op: VarOp, slot: u16) -> Self {
        Self::Var { op, slot }
    }

    pub const fn goto(target: Label) -> Self {
        Self::Jump {
            cond: JumpCond::Goto,
            target,
        }
    }

    pub const fn jump(cond: JumpCond, target: Label) -> Self {
        Self::Jump { cond, target }
    }

    /// Pushes an int constant; the codec picks the shortest encoding.
    pub const fn push_int(value: i32) -> Self {
        Self::Const(Constant::Int(value))
    }

    pub fn invoke_static(owner: &str, name: &str, desc: &str) -> Self {
        Self::Invoke {
            kind: InvokeKind::Static,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            interface: false,
        }
    }

    pub fn invoke_virtual(owner: &str, name: &str, desc: &str) -> Self {
        Self::Invoke {
            kind: InvokeKind::Virtual,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            interface: false,
        }
    }

    pub fn invoke_special(owner: &str, name: &str, desc: &str) -> Self {
        Self::Invoke {
            kind: InvokeKind::Special,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            interface: false,
        }
    }

    pub fn type_op(op: TypeOp, ty: &str) -> Self {
        Self::Type {
            op,
            ty: ty.to_string(),
        }
    }

    /// Whether this entry is a label marker rather than an executable instruction.
    pub const fn is_marker(&self) -> bool {
        matches!(self, Self::Label(_))
    }

    pub const fn is_legacy_subroutine(&self) -> bool {
        matches!(self, Self::Jsr(_) | Self::Ret(_))
    }

    /// Labels this instruction may transfer control to.
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Self::Jump { target, .. } | Self::Jsr(target) => vec![*target],
            Self::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Self::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, l)| *l))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether control can reach the next instruction in the list.
    pub const fn falls_through(&self) -> bool {
        match self {
            Self::Simple(op) => !op.is_terminal(),
            Self::Jump {
                cond: JumpCond::Goto,
                ..
            }
            | Self::TableSwitch { .. }
            | Self::LookupSwitch { .. }
            | Self::Jsr(_)
            | Self::Ret(_) => false,
            _ => true,
        }
    }

    /// Rewrites every label operand (including a marker's own label).
    pub fn map_labels(&mut self, f: &mut impl FnMut(Label) -> Label) {
        match self {
            Self::Jump { target, .. } | Self::Jsr(target) | Self::Label(target) => {
                *target = f(*target);
            }
            Self::TableSwitch {
                default, targets, ..
            } => {
                *default = f(*default);
                for t in targets {
                    *t = f(*t);
                }
            }
            Self::LookupSwitch { default, pairs } => {
                *default = f(*default);
                for (_, t) in pairs {
                    *t = f(*t);
                }
            }
            _ => {}
        }
    }
}

/// Hands out labels that do not collide with any label already used in a method.
#[derive(Debug, Clone)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub const fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub const fn fresh(&mut self) -> Label {
        let label = Label(self.next);
        self.next += 1;
        label
    }
}

/// Deep-copies an instruction fragment, giving every label placed inside it a
/// fresh identity. References to labels outside the fragment are kept as is.
pub fn clone_fragment(src: &[Instruction], labels: &mut LabelAllocator) -> Vec<Instruction> {
    let renames: HashMap<Label, Label> = src
        .iter()
        .filter_map(|insn| match insn {
            Instruction::Label(l) => Some(*l),
            _ => None,
        })
        .map(|l| (l, labels.fresh()))
        .collect();

    src.iter()
        .map(|insn| {
            let mut copy = insn.clone();
            copy.map_labels(&mut |l| renames.get(&l).copied().unwrap_or(l));
            copy
        })
        .collect()
}
