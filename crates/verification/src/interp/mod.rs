//! Reference interpreter for the instruction model.
//!
//! Executes static and virtual calls over a [`Program`], modelling just enough
//! of the platform (see [`intrinsics`]) to run the code the obfuscator emits and
//! the fixtures the tests feed it. Observable behaviour is the returned value or
//! thrown exception type, plus every printed line.

mod frame;
pub mod intrinsics;
pub mod value;

use crate::config::VerificationConfig;
use classcloak_core::descriptor::MethodDescriptor;
use classcloak_core::hierarchy::CommonAncestorResolver;
use classcloak_core::insn::{Constant, FieldOp, Instruction, InvokeKind, Label, Op, TypeOp};
use classcloak_core::program::{MethodDef, TypeDef};
use classcloak_core::{OBJECT, Program};
use classcloak_utils::errors::VerificationError;
use frame::Frame;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::trace;
pub use value::{Elements, Heap, HeapObject, Ref, Value, elements_of};

/// Result alias for interpreter operations.
pub type InterpResult<T> = Result<T, VerificationError>;

/// Argument passed to an entry call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Null,
}

/// How a run is entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Call {
    /// A static method.
    Static {
        owner: String,
        name: String,
        desc: String,
        args: Vec<Arg>,
    },
    /// `new class()` followed by a virtual call on the new object.
    Instance {
        class: String,
        name: String,
        desc: String,
        args: Vec<Arg>,
    },
    /// `main(String[])` with an empty argument array.
    Main { class: String },
}

impl Call {
    pub fn static_method(owner: &str, name: &str, desc: &str, args: Vec<Arg>) -> Self {
        Self::Static {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
            args,
        }
    }

    pub fn instance_method(class: &str, name: &str, desc: &str, args: Vec<Arg>) -> Self {
        Self::Instance {
            class: class.into(),
            name: name.into(),
            desc: desc.into(),
            args,
        }
    }
}

/// A returned value, detached from the heap it lived in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observed {
    Void,
    Int(i32),
    Long(i64),
    /// Bit pattern, so NaN compares equal to itself.
    Float(u32),
    Double(u64),
    Null,
    Str(String),
    /// Any other object, by runtime type.
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    Returned(Observed),
    /// Uncaught exception, by runtime type.
    Threw(String),
}

/// Everything a run exposes to the outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub termination: Termination,
    pub output: Vec<String>,
}

/// How a method body finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    Return(Option<Value>),
    Throw(Ref),
}

/// What the loop does after one instruction.
enum Step {
    Next,
    Jump(Label),
    Return(Option<Value>),
    Throw(Ref),
}

const THROWABLE: &str = "java/lang/Throwable";

/// Interpreter state for one run.
#[derive(Debug)]
pub struct Machine<'p> {
    program: &'p Program,
    resolver: CommonAncestorResolver<'p>,
    config: VerificationConfig,
    heap: Heap,
    statics: HashMap<(String, String), Value>,
    initialized: HashSet<String>,
    output: Vec<String>,
    pending: String,
    print_stream: Option<Ref>,
    clock: i64,
    steps: u64,
    depth: usize,
}

/// Runs `call` against `program` on a fresh machine.
pub fn execute(program: &Program, call: &Call, config: &VerificationConfig) -> InterpResult<Outcome> {
    Machine::new(program, config.clone()).call(call)
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p Program, config: VerificationConfig) -> Self {
        Self {
            program,
            resolver: CommonAncestorResolver::with_platform(program),
            clock: config.nano_time_start,
            config,
            heap: Heap::default(),
            statics: HashMap::new(),
            initialized: HashSet::new(),
            output: Vec::new(),
            pending: String::new(),
            print_stream: None,
            steps: 0,
            depth: 0,
        }
    }

    /// Instructions executed so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Performs one entry call and collects its outcome.
    pub fn call(mut self, call: &Call) -> InterpResult<Outcome> {
        let flow = match call {
            Call::Static {
                owner,
                name,
                desc,
                args,
            } => {
                self.require(owner, name, desc)?;
                let args = self.arguments(args);
                match self.ensure_init(owner)? {
                    Some(t) => Flow::Throw(t),
                    None => self.invoke(InvokeKind::Static, owner, name, desc, args)?,
                }
            }
            Call::Instance {
                class,
                name,
                desc,
                args,
            } => {
                self.require(class, "<init>", "()V")?;
                let mut args = self.arguments(args);
                match self.ensure_init(class)? {
                    Some(t) => Flow::Throw(t),
                    None => {
                        let receiver = Value::Ref(self.heap.new_instance(class));
                        match self.invoke(InvokeKind::Special, class, "<init>", "()V", vec![receiver])? {
                            Flow::Throw(t) => Flow::Throw(t),
                            Flow::Return(_) => {
                                args.insert(0, receiver);
                                self.invoke(InvokeKind::Virtual, class, name, desc, args)?
                            }
                        }
                    }
                }
            }
            Call::Main { class } => {
                let desc = "([Ljava/lang/String;)V";
                self.require(class, "main", desc)?;
                let argv = self.heap.alloc(HeapObject::Array {
                    desc: "[Ljava/lang/String;".into(),
                    elements: Elements::Reference,
                    values: Vec::new(),
                });
                match self.ensure_init(class)? {
                    Some(t) => Flow::Throw(t),
                    None => self.invoke(InvokeKind::Static, class, "main", desc, vec![Value::Ref(argv)])?,
                }
            }
        };

        let termination = match flow {
            Flow::Return(v) => Termination::Returned(self.observe(v)),
            Flow::Throw(r) => Termination::Threw(self.heap.get(r).class_name().to_string()),
        };
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.output.push(rest);
        }
        trace!("run finished after {} steps", self.steps);
        Ok(Outcome {
            termination,
            output: self.output,
        })
    }

    fn require(&self, owner: &str, name: &str, desc: &str) -> InterpResult<()> {
        if self.find_declared(owner, name, desc).is_some() {
            Ok(())
        } else {
            Err(VerificationError::NoSuchMethod {
                owner: owner.into(),
                name: name.into(),
                desc: desc.into(),
            })
        }
    }

    fn arguments(&mut self, args: &[Arg]) -> Vec<Value> {
        args.iter()
            .map(|a| match a {
                Arg::Int(v) => Value::Int(*v),
                Arg::Long(v) => Value::Long(*v),
                Arg::Float(v) => Value::Float(*v),
                Arg::Double(v) => Value::Double(*v),
                Arg::Str(s) => Value::Ref(self.heap.intern(s)),
                Arg::Null => Value::Null,
            })
            .collect()
    }

    fn observe(&self, value: Option<Value>) -> Observed {
        match value {
            None | Some(Value::Top) => Observed::Void,
            Some(Value::Int(v)) => Observed::Int(v),
            Some(Value::Long(v)) => Observed::Long(v),
            Some(Value::Float(v)) => Observed::Float(v.to_bits()),
            Some(Value::Double(v)) => Observed::Double(v.to_bits()),
            Some(Value::Null) => Observed::Null,
            Some(Value::Ref(r)) => match self.heap.get(r) {
                HeapObject::Str(s) => Observed::Str(s.clone()),
                obj => Observed::Object(obj.class_name().to_string()),
            },
        }
    }

    fn tick(&mut self) -> InterpResult<()> {
        self.steps += 1;
        if self.steps > self.config.step_limit {
            return Err(VerificationError::StepLimit(self.config.step_limit));
        }
        Ok(())
    }

    // ---- program lookups ----

    /// First type in `owner`'s superclass chain (inside the program) declaring
    /// `name:desc`.
    fn find_declared(&self, owner: &str, name: &str, desc: &str) -> Option<(&'p TypeDef, &'p MethodDef)> {
        let program = self.program;
        let mut seen = HashSet::new();
        let mut current = program.get(owner);
        while let Some(ty) = current {
            if !seen.insert(ty.name.as_str()) {
                break;
            }
            if let Some(m) = ty.find_method(name, desc) {
                return Some((ty, m));
            }
            current = ty.super_name.as_deref().and_then(|s| program.get(s));
        }
        None
    }

    /// Virtual selection from a runtime type: superclass chain first, then
    /// default methods of reachable interfaces.
    fn select_virtual(&self, runtime: &str, name: &str, desc: &str) -> Option<(&'p TypeDef, &'p MethodDef)> {
        let program = self.program;
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = program.get(runtime);
        while let Some(ty) = current {
            if !seen.insert(ty.name.as_str()) {
                break;
            }
            if let Some(m) = ty.find_method(name, desc) {
                if m.has_body() && !m.access.is_static() {
                    return Some((ty, m));
                }
            }
            chain.push(ty);
            current = ty.super_name.as_deref().and_then(|s| program.get(s));
        }

        let mut frontier: Vec<&str> = chain
            .iter()
            .flat_map(|t| t.interfaces.iter().map(String::as_str))
            .collect();
        while let Some(iface) = frontier.pop() {
            if !seen.insert(iface) {
                continue;
            }
            let Some(ty) = program.get(iface) else {
                continue;
            };
            if let Some(m) = ty.find_method(name, desc) {
                if m.has_body() && !m.access.is_static() {
                    return Some((ty, m));
                }
            }
            frontier.extend(ty.interfaces.iter().map(String::as_str));
        }
        None
    }

    /// Declaring type of a field reference, searched the way the linker does.
    fn resolve_field(&self, owner: &str, name: &str, desc: &str) -> String {
        fn lookup<'a>(program: &'a Program, owner: &str, name: &str, desc: &str, seen: &mut HashSet<String>) -> Option<&'a str> {
            let ty = program.get(owner)?;
            if !seen.insert(owner.to_string()) {
                return None;
            }
            if ty.find_field(name, desc).is_some() {
                return Some(ty.name.as_str());
            }
            for iface in &ty.interfaces {
                if let Some(found) = lookup(program, iface, name, desc, seen) {
                    return Some(found);
                }
            }
            lookup(program, ty.super_name.as_deref()?, name, desc, seen)
        }
        lookup(self.program, owner, name, desc, &mut HashSet::new())
            .unwrap_or(owner)
            .to_string()
    }

    /// Runs the static initializer chain of a program type once. Returns the
    /// exception it threw, if any.
    fn ensure_init(&mut self, class: &str) -> InterpResult<Option<Ref>> {
        let program = self.program;
        let Some(ty) = program.get(class) else {
            return Ok(None);
        };
        if !self.initialized.insert(class.to_string()) {
            return Ok(None);
        }
        if let Some(sup) = ty.super_name.as_deref() {
            if let Some(t) = self.ensure_init(sup)? {
                return Ok(Some(t));
            }
        }
        if let Some(clinit) = ty.find_method("<clinit>", "()V") {
            if let Flow::Throw(t) = self.run_method(&ty.name, clinit, Vec::new())? {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }

    /// Whether the object is an instance of `ty` (an internal name or array descriptor).
    pub fn is_instance(&self, r: Ref, ty: &str) -> bool {
        let class = self.heap.get(r).class_name();
        if class.starts_with('[') {
            return ty == class
                || ty == OBJECT
                || ty == "java/lang/Cloneable"
                || ty == "java/io/Serializable";
        }
        !ty.starts_with('[') && self.resolver.is_assignable(ty, class)
    }

    /// Allocates a platform exception.
    pub fn raise(&mut self, class: &str, message: Option<&str>) -> Ref {
        let r = self.heap.new_instance(class);
        if let Some(message) = message {
            let text = Value::Ref(self.heap.alloc(HeapObject::Str(message.to_string())));
            self.set_field(r, THROWABLE, "message", text);
        }
        r
    }

    fn set_field(&mut self, r: Ref, declaring: &str, name: &str, value: Value) {
        if let HeapObject::Instance { fields, .. } = self.heap.get_mut(r) {
            fields.insert((declaring.to_string(), name.to_string()), value);
        }
    }

    fn get_field(&self, r: Ref, declaring: &str, name: &str) -> Option<Value> {
        match self.heap.get(r) {
            HeapObject::Instance { fields, .. } => {
                fields.get(&(declaring.to_string(), name.to_string())).copied()
            }
            _ => None,
        }
    }

    // ---- invocation ----

    /// Invokes a method with receiver (if any) and arguments already in order.
    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> InterpResult<Flow> {
        if kind == InvokeKind::Static {
            if let Some(t) = self.ensure_init(owner)? {
                return Ok(Flow::Throw(t));
            }
            return match self.find_declared(owner, name, desc) {
                Some((ty, m)) if m.has_body() => self.run_method(&ty.name, m, args),
                _ => self.intrinsic(kind, owner, name, desc, args),
            };
        }

        let receiver = match args.first() {
            Some(Value::Ref(r)) => *r,
            Some(Value::Null) => return Ok(Flow::Throw(self.raise("java/lang/NullPointerException", None))),
            _ => {
                return Err(VerificationError::Malformed {
                    method: format!("{owner}.{name}{desc}"),
                    reason: "missing receiver".into(),
                });
            }
        };

        let target = if kind == InvokeKind::Special {
            self.find_declared(owner, name, desc)
                .filter(|(_, m)| m.has_body())
        } else {
            let runtime = self.heap.get(receiver).class_name().to_string();
            self.select_virtual(&runtime, name, desc)
        };
        match target {
            Some((ty, m)) => self.run_method(&ty.name, m, args),
            None => self.intrinsic(kind, owner, name, desc, args),
        }
    }

    fn run_method(&mut self, owner: &str, method: &'p MethodDef, args: Vec<Value>) -> InterpResult<Flow> {
        if self.depth >= self.config.max_depth {
            return Err(VerificationError::DepthLimit(self.config.max_depth));
        }
        self.depth += 1;
        let context = format!("{}.{}{}", owner, method.name, method.desc);
        let result = self.run_body(&context, method, args);
        self.depth -= 1;
        result
    }

    fn run_body(&mut self, context: &str, method: &'p MethodDef, args: Vec<Value>) -> InterpResult<Flow> {
        let code = &method.instructions;
        let labels: HashMap<Label, usize> = code
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Instruction::Label(l) => Some((*l, i)),
                _ => None,
            })
            .collect();
        let place = |label: Label| {
            labels
                .get(&label)
                .copied()
                .ok_or_else(|| VerificationError::MissingLabel {
                    method: context.to_string(),
                    label: label.0,
                })
        };

        let mut frame = Frame::new(context, method.max_locals, args);
        let mut pc = 0usize;
        loop {
            let Some(insn) = code.get(pc) else {
                return Err(frame.malformed("execution ran past the last instruction"));
            };
            if !insn.is_marker() {
                self.tick()?;
            }
            match self.step(&mut frame, insn)? {
                Step::Next => pc += 1,
                Step::Jump(label) => pc = place(label)?,
                Step::Return(v) => return Ok(Flow::Return(v)),
                Step::Throw(exc) => {
                    let thrown = self.heap.get(exc).class_name().to_string();
                    let mut handler = None;
                    for region in &method.exception_regions {
                        let (start, end) = (place(region.start)?, place(region.end)?);
                        let catches = region
                            .catch_type
                            .as_deref()
                            .is_none_or(|c| self.resolver.is_assignable(c, &thrown));
                        if start <= pc && pc < end && catches {
                            handler = Some(place(region.handler)?);
                            break;
                        }
                    }
                    match handler {
                        Some(h) => {
                            trace!("{}: {} caught at {}", context, thrown, h);
                            frame.catch(Value::Ref(exc));
                            pc = h;
                        }
                        None => return Ok(Flow::Throw(exc)),
                    }
                }
            }
        }
    }

    fn npe(&mut self) -> Step {
        Step::Throw(self.raise("java/lang/NullPointerException", None))
    }

    fn step(&mut self, frame: &mut Frame, insn: &Instruction) -> InterpResult<Step> {
        match insn {
            Instruction::Label(_) => {}
            Instruction::Simple(op) => return self.simple(frame, *op),
            Instruction::Var { op, slot } => {
                if op.is_store() {
                    let v = frame.pop()?;
                    frame.store(*slot, v)?;
                } else {
                    let v = frame.load(*slot)?;
                    frame.push(v);
                }
            }
            Instruction::Iinc { slot, delta } => {
                let Value::Int(v) = frame.load(*slot)? else {
                    return Err(frame.malformed("iinc on a non-int slot"));
                };
                frame.store(*slot, Value::Int(v.wrapping_add(i32::from(*delta))))?;
            }
            Instruction::Const(c) => {
                let v = match c {
                    Constant::Int(v) => Value::Int(*v),
                    Constant::Long(v) => Value::Long(*v),
                    Constant::Float(v) => Value::Float(*v),
                    Constant::Double(v) => Value::Double(*v),
                    Constant::String(s) => Value::Ref(self.heap.intern(s)),
                    Constant::Type(t) => Value::Ref(self.heap.alloc(HeapObject::Class(t.clone()))),
                    Constant::MethodType(_) | Constant::Handle(_) => {
                        return Err(VerificationError::Unsupported(format!("{c:?}")));
                    }
                };
                frame.push(v);
            }
            Instruction::Type { op, ty } => return self.type_op(frame, *op, ty),
            Instruction::NewArray(kind) => {
                let count = frame.pop_int()?;
                if count < 0 {
                    return Ok(Step::Throw(self.raise(
                        "java/lang/NegativeArraySizeException",
                        Some(&count.to_string()),
                    )));
                }
                let elements = Elements::Primitive(*kind);
                let r = self.heap.alloc(HeapObject::Array {
                    desc: format!("[{}", elements.descriptor_char()),
                    elements,
                    values: vec![elements.zero(); count as usize],
                });
                frame.push(Value::Ref(r));
            }
            Instruction::MultiANewArray { desc, dims } => {
                let mut counts = Vec::with_capacity(usize::from(*dims));
                for _ in 0..*dims {
                    counts.push(frame.pop_int()?);
                }
                counts.reverse();
                if let Some(&bad) = counts.iter().find(|&&c| c < 0) {
                    return Ok(Step::Throw(self.raise(
                        "java/lang/NegativeArraySizeException",
                        Some(&bad.to_string()),
                    )));
                }
                let r = self.multi_array(desc, &counts);
                frame.push(Value::Ref(r));
            }
            Instruction::Field {
                op,
                owner,
                name,
                desc,
            } => return self.field(frame, *op, owner, name, desc),
            Instruction::Invoke {
                kind,
                owner,
                name,
                desc,
                ..
            } => {
                let params = MethodDescriptor::parse(desc)?.params.len();
                let receiver = usize::from(*kind != InvokeKind::Static);
                let mut args = Vec::with_capacity(params + receiver);
                for _ in 0..params + receiver {
                    args.push(frame.pop()?);
                }
                args.reverse();
                match self.invoke(*kind, owner, name, desc, args)? {
                    Flow::Return(Some(v)) => frame.push(v),
                    Flow::Return(None) => {}
                    Flow::Throw(t) => return Ok(Step::Throw(t)),
                }
            }
            Instruction::InvokeDynamic { name, desc, .. } => {
                return Err(VerificationError::Unsupported(format!("invokedynamic {name}{desc}")));
            }
            Instruction::Jump { cond, target } => {
                if frame.branch(*cond)? {
                    return Ok(Step::Jump(*target));
                }
            }
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                let index = frame.pop_int()?;
                let target = if (*low..=*high).contains(&index) {
                    targets
                        .get((i64::from(index) - i64::from(*low)) as usize)
                        .copied()
                        .unwrap_or(*default)
                } else {
                    *default
                };
                return Ok(Step::Jump(target));
            }
            Instruction::LookupSwitch { default, pairs } => {
                let key = frame.pop_int()?;
                let target = pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map_or(*default, |(_, l)| *l);
                return Ok(Step::Jump(target));
            }
            Instruction::Jsr(_) | Instruction::Ret(_) => {
                return Err(VerificationError::Unsupported("legacy subroutine".into()));
            }
        }
        Ok(Step::Next)
    }

    fn multi_array(&mut self, desc: &str, counts: &[i32]) -> Ref {
        let inner = &desc[1..];
        let (elements, values) = match counts {
            [] | [_] => {
                let elements = elements_of(desc);
                let len = counts.first().copied().unwrap_or(0) as usize;
                (elements, vec![elements.zero(); len])
            }
            [first, rest @ ..] => {
                let values = (0..*first)
                    .map(|_| Value::Ref(self.multi_array(inner, rest)))
                    .collect();
                (Elements::Reference, values)
            }
        };
        self.heap.alloc(HeapObject::Array {
            desc: desc.to_string(),
            elements,
            values,
        })
    }

    fn type_op(&mut self, frame: &mut Frame, op: TypeOp, ty: &str) -> InterpResult<Step> {
        match op {
            TypeOp::New => {
                if let Some(t) = self.ensure_init(ty)? {
                    return Ok(Step::Throw(t));
                }
                let r = self.heap.new_instance(ty);
                frame.push(Value::Ref(r));
            }
            TypeOp::ANewArray => {
                let count = frame.pop_int()?;
                if count < 0 {
                    return Ok(Step::Throw(self.raise(
                        "java/lang/NegativeArraySizeException",
                        Some(&count.to_string()),
                    )));
                }
                let desc = if ty.starts_with('[') {
                    format!("[{ty}")
                } else {
                    format!("[L{ty};")
                };
                let r = self.heap.alloc(HeapObject::Array {
                    desc,
                    elements: Elements::Reference,
                    values: vec![Value::Null; count as usize],
                });
                frame.push(Value::Ref(r));
            }
            TypeOp::CheckCast => {
                if let Value::Ref(r) = frame.peek()? {
                    if !self.is_instance(r, ty) {
                        let message = format!(
                            "class {} cannot be cast to class {}",
                            self.heap.get(r).class_name().replace('/', "."),
                            ty.replace('/', ".")
                        );
                        return Ok(Step::Throw(
                            self.raise("java/lang/ClassCastException", Some(&message)),
                        ));
                    }
                }
            }
            TypeOp::InstanceOf => {
                let v = frame.pop()?;
                let yes = matches!(v, Value::Ref(r) if self.is_instance(r, ty));
                frame.push(Value::Int(i32::from(yes)));
            }
        }
        Ok(Step::Next)
    }

    fn field(&mut self, frame: &mut Frame, op: FieldOp, owner: &str, name: &str, desc: &str) -> InterpResult<Step> {
        match op {
            FieldOp::GetStatic | FieldOp::PutStatic => {
                if op == FieldOp::GetStatic && owner == "java/lang/System" && (name == "out" || name == "err") {
                    let r = self.print_stream();
                    frame.push(Value::Ref(r));
                    return Ok(Step::Next);
                }
                let declaring = self.resolve_field(owner, name, desc);
                if !self.program.contains(&declaring) {
                    return Err(VerificationError::Unsupported(format!("static field {owner}.{name}")));
                }
                if let Some(t) = self.ensure_init(&declaring)? {
                    return Ok(Step::Throw(t));
                }
                let key = (declaring, name.to_string());
                if op == FieldOp::GetStatic {
                    let v = self
                        .statics
                        .get(&key)
                        .copied()
                        .unwrap_or_else(|| Value::default_for(desc));
                    frame.push(v);
                } else {
                    let v = frame.pop()?;
                    self.statics.insert(key, v);
                }
            }
            FieldOp::GetField => {
                let Some(r) = frame.pop_ref()? else {
                    return Ok(self.npe());
                };
                let declaring = self.resolve_field(owner, name, desc);
                let v = self
                    .get_field(r, &declaring, name)
                    .unwrap_or_else(|| Value::default_for(desc));
                frame.push(v);
            }
            FieldOp::PutField => {
                let v = frame.pop()?;
                let Some(r) = frame.pop_ref()? else {
                    return Ok(self.npe());
                };
                let declaring = self.resolve_field(owner, name, desc);
                self.set_field(r, &declaring, name, v);
            }
        }
        Ok(Step::Next)
    }

    fn print_stream(&mut self) -> Ref {
        if let Some(r) = self.print_stream {
            return r;
        }
        let r = self.heap.new_instance("java/io/PrintStream");
        self.print_stream = Some(r);
        r
    }

    fn array_bounds(&mut self, r: Ref, index: i32) -> Option<Step> {
        let HeapObject::Array { values, .. } = self.heap.get(r) else {
            return None;
        };
        let len = values.len();
        if index < 0 || index as usize >= len {
            let message = format!("Index {index} out of bounds for length {len}");
            return Some(Step::Throw(
                self.raise("java/lang/ArrayIndexOutOfBoundsException", Some(&message)),
            ));
        }
        None
    }

    fn simple(&mut self, frame: &mut Frame, op: Op) -> InterpResult<Step> {
        use Op::*;
        match op {
            Nop => {}
            AconstNull => frame.push(Value::Null),

            IaLoad | LaLoad | FaLoad | DaLoad | AaLoad | BaLoad | CaLoad | SaLoad => {
                let index = frame.pop_int()?;
                let Some(r) = frame.pop_ref()? else {
                    return Ok(self.npe());
                };
                if let Some(thrown) = self.array_bounds(r, index) {
                    return Ok(thrown);
                }
                let HeapObject::Array { values, .. } = self.heap.get(r) else {
                    return Err(frame.malformed("array load from a non-array"));
                };
                frame.push(values[index as usize]);
            }
            IaStore | LaStore | FaStore | DaStore | AaStore | BaStore | CaStore | SaStore => {
                let value = frame.pop()?;
                let index = frame.pop_int()?;
                let Some(r) = frame.pop_ref()? else {
                    return Ok(self.npe());
                };
                if let Some(thrown) = self.array_bounds(r, index) {
                    return Ok(thrown);
                }
                let HeapObject::Array { elements, values, .. } = self.heap.get_mut(r) else {
                    return Err(frame.malformed("array store into a non-array"));
                };
                values[index as usize] = elements.narrow(value);
            }

            Pop => {
                frame.pop_slots(1)?;
            }
            Pop2 => {
                frame.pop_slots(2)?;
            }
            Dup => {
                let a = frame.pop_slots(1)?;
                frame.push_all(&a);
                frame.push_all(&a);
            }
            DupX1 => {
                let a = frame.pop_slots(1)?;
                let b = frame.pop_slots(1)?;
                frame.push_all(&a);
                frame.push_all(&b);
                frame.push_all(&a);
            }
            DupX2 => {
                let a = frame.pop_slots(1)?;
                let b = frame.pop_slots(2)?;
                frame.push_all(&a);
                frame.push_all(&b);
                frame.push_all(&a);
            }
            Dup2 => {
                let a = frame.pop_slots(2)?;
                frame.push_all(&a);
                frame.push_all(&a);
            }
            Dup2X1 => {
                let a = frame.pop_slots(2)?;
                let b = frame.pop_slots(1)?;
                frame.push_all(&a);
                frame.push_all(&b);
                frame.push_all(&a);
            }
            Dup2X2 => {
                let a = frame.pop_slots(2)?;
                let b = frame.pop_slots(2)?;
                frame.push_all(&a);
                frame.push_all(&b);
                frame.push_all(&a);
            }
            Swap => {
                let a = frame.pop_slots(1)?;
                let b = frame.pop_slots(1)?;
                frame.push_all(&a);
                frame.push_all(&b);
            }

            IAdd => frame.int_op(i32::wrapping_add)?,
            ISub => frame.int_op(i32::wrapping_sub)?,
            IMul => frame.int_op(i32::wrapping_mul)?,
            IAnd => frame.int_op(|a, b| a & b)?,
            IOr => frame.int_op(|a, b| a | b)?,
            IXor => frame.int_op(|a, b| a ^ b)?,
            IShl => frame.int_op(|a, b| a.wrapping_shl(b as u32))?,
            IShr => frame.int_op(|a, b| a.wrapping_shr(b as u32))?,
            IUShr => frame.int_op(|a, b| (a as u32).wrapping_shr(b as u32) as i32)?,
            IDiv | IRem => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                if b == 0 {
                    return Ok(Step::Throw(
                        self.raise("java/lang/ArithmeticException", Some("/ by zero")),
                    ));
                }
                let v = if op == IDiv { a.wrapping_div(b) } else { a.wrapping_rem(b) };
                frame.push(Value::Int(v));
            }
            INeg => {
                let a = frame.pop_int()?;
                frame.push(Value::Int(a.wrapping_neg()));
            }

            LAdd => frame.long_op(i64::wrapping_add)?,
            LSub => frame.long_op(i64::wrapping_sub)?,
            LMul => frame.long_op(i64::wrapping_mul)?,
            LAnd => frame.long_op(|a, b| a & b)?,
            LOr => frame.long_op(|a, b| a | b)?,
            LXor => frame.long_op(|a, b| a ^ b)?,
            LDiv | LRem => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                if b == 0 {
                    return Ok(Step::Throw(
                        self.raise("java/lang/ArithmeticException", Some("/ by zero")),
                    ));
                }
                let v = if op == LDiv { a.wrapping_div(b) } else { a.wrapping_rem(b) };
                frame.push(Value::Long(v));
            }
            LNeg => {
                let a = frame.pop_long()?;
                frame.push(Value::Long(a.wrapping_neg()));
            }
            LShl | LShr | LUShr => {
                let s = frame.pop_int()? as u32;
                let a = frame.pop_long()?;
                let v = match op {
                    LShl => a.wrapping_shl(s),
                    LShr => a.wrapping_shr(s),
                    _ => (a as u64).wrapping_shr(s) as i64,
                };
                frame.push(Value::Long(v));
            }

            FAdd => frame.float_op(|a, b| a + b)?,
            FSub => frame.float_op(|a, b| a - b)?,
            FMul => frame.float_op(|a, b| a * b)?,
            FDiv => frame.float_op(|a, b| a / b)?,
            FRem => frame.float_op(|a, b| a % b)?,
            FNeg => {
                let a = frame.pop_float()?;
                frame.push(Value::Float(-a));
            }
            DAdd => frame.double_op(|a, b| a + b)?,
            DSub => frame.double_op(|a, b| a - b)?,
            DMul => frame.double_op(|a, b| a * b)?,
            DDiv => frame.double_op(|a, b| a / b)?,
            DRem => frame.double_op(|a, b| a % b)?,
            DNeg => {
                let a = frame.pop_double()?;
                frame.push(Value::Double(-a));
            }

            I2L => {
                let v = frame.pop_int()?;
                frame.push(Value::Long(i64::from(v)));
            }
            I2F => {
                let v = frame.pop_int()?;
                frame.push(Value::Float(v as f32));
            }
            I2D => {
                let v = frame.pop_int()?;
                frame.push(Value::Double(f64::from(v)));
            }
            L2I => {
                let v = frame.pop_long()?;
                frame.push(Value::Int(v as i32));
            }
            L2F => {
                let v = frame.pop_long()?;
                frame.push(Value::Float(v as f32));
            }
            L2D => {
                let v = frame.pop_long()?;
                frame.push(Value::Double(v as f64));
            }
            F2I => {
                let v = frame.pop_float()?;
                frame.push(Value::Int(v as i32));
            }
            F2L => {
                let v = frame.pop_float()?;
                frame.push(Value::Long(v as i64));
            }
            F2D => {
                let v = frame.pop_float()?;
                frame.push(Value::Double(f64::from(v)));
            }
            D2I => {
                let v = frame.pop_double()?;
                frame.push(Value::Int(v as i32));
            }
            D2L => {
                let v = frame.pop_double()?;
                frame.push(Value::Long(v as i64));
            }
            D2F => {
                let v = frame.pop_double()?;
                frame.push(Value::Float(v as f32));
            }
            I2B => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(i32::from(v as i8)));
            }
            I2C => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(i32::from(v as u16)));
            }
            I2S => {
                let v = frame.pop_int()?;
                frame.push(Value::Int(i32::from(v as i16)));
            }

            LCmp => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                frame.push(Value::Int(a.cmp(&b) as i32));
            }
            FCmpL | FCmpG => {
                let b = frame.pop_float()?;
                let a = frame.pop_float()?;
                let nan = if op == FCmpL { -1 } else { 1 };
                frame.push(Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32)));
            }
            DCmpL | DCmpG => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                let nan = if op == DCmpL { -1 } else { 1 };
                frame.push(Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32)));
            }

            IReturn | LReturn | FReturn | DReturn | AReturn => {
                return Ok(Step::Return(Some(frame.pop()?)));
            }
            Return => return Ok(Step::Return(None)),

            ArrayLength => {
                let Some(r) = frame.pop_ref()? else {
                    return Ok(self.npe());
                };
                let HeapObject::Array { values, .. } = self.heap.get(r) else {
                    return Err(frame.malformed("arraylength of a non-array"));
                };
                frame.push(Value::Int(values.len() as i32));
            }
            AThrow => {
                let Some(r) = frame.pop_ref()? else {
                    return Ok(self.npe());
                };
                return Ok(Step::Throw(r));
            }
            MonitorEnter | MonitorExit => {
                if frame.pop_ref()?.is_none() {
                    return Ok(self.npe());
                }
            }
        }
        Ok(Step::Next)
    }
}

#[cfg(test)]
mod tests;
