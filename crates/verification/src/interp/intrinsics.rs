//! The slice of the platform library the interpreter implements natively.
//!
//! Calls reach this module when no body for the target exists in the program.
//! Constructors dispatch on the named owner; instance methods dispatch on the
//! receiver's heap representation, so a call declared on `java/lang/Object`
//! still finds a string's `hashCode`.

use super::value::{Heap, HeapObject, Ref, Value};
use super::{Flow, InterpResult, Machine, THROWABLE};
use classcloak_core::insn::InvokeKind;
use classcloak_core::OBJECT;
use classcloak_utils::errors::VerificationError;

const MESSAGE: &str = "message";

fn unsupported(owner: &str, name: &str, desc: &str) -> VerificationError {
    VerificationError::Unsupported(format!("{owner}.{name}{desc}"))
}

fn int_arg(args: &[Value], i: usize) -> i32 {
    match args.get(i) {
        Some(Value::Int(v)) => *v,
        _ => 0,
    }
}

impl Machine<'_> {
    pub(super) fn intrinsic(
        &mut self,
        kind: InvokeKind,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> InterpResult<Flow> {
        if name == "<init>" {
            return self.construct(owner, desc, &args);
        }
        if kind == InvokeKind::Static {
            return self.static_intrinsic(owner, name, desc, &args);
        }
        self.virtual_intrinsic(owner, name, desc, &args)
    }

    fn string_value(&mut self, s: String) -> Value {
        Value::Ref(self.heap.alloc(HeapObject::Str(s)))
    }

    fn text_of(&self, v: Value) -> Option<String> {
        match v {
            Value::Ref(r) => match self.heap.get(r) {
                HeapObject::Str(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn construct(&mut self, owner: &str, desc: &str, args: &[Value]) -> InterpResult<Flow> {
        let Some(&Value::Ref(r)) = args.first() else {
            return Err(unsupported(owner, "<init>", desc));
        };
        let done = Ok(Flow::Return(None));
        match (owner, desc) {
            (OBJECT, "()V") => done,
            ("java/lang/String", "()V") => {
                self.heap.replace(r, HeapObject::Str(String::new()));
                done
            }
            ("java/lang/String", "(Ljava/lang/String;)V") => {
                let Some(s) = self.text_of(args[1]) else {
                    return Ok(Flow::Throw(self.raise("java/lang/NullPointerException", None)));
                };
                self.heap.replace(r, HeapObject::Str(s));
                done
            }
            ("java/lang/String", "([C)V") => {
                let chars = match args[1] {
                    Value::Ref(a) => match self.heap.get(a) {
                        HeapObject::Array { values, .. } => values
                            .iter()
                            .map(|v| match v {
                                Value::Int(c) => *c as u16,
                                _ => 0,
                            })
                            .collect::<Vec<u16>>(),
                        _ => return Err(unsupported(owner, "<init>", desc)),
                    },
                    _ => return Ok(Flow::Throw(self.raise("java/lang/NullPointerException", None))),
                };
                self.heap
                    .replace(r, HeapObject::Str(String::from_utf16_lossy(&chars)));
                done
            }
            ("java/lang/StringBuilder", "()V") => {
                self.heap.replace(r, HeapObject::Builder(String::new()));
                done
            }
            ("java/lang/StringBuilder", "(Ljava/lang/String;)V") => {
                let Some(s) = self.text_of(args[1]) else {
                    return Ok(Flow::Throw(self.raise("java/lang/NullPointerException", None)));
                };
                self.heap.replace(r, HeapObject::Builder(s));
                done
            }
            ("java/lang/Integer", "(I)V") => {
                self.heap.replace(r, HeapObject::Boxed(int_arg(args, 1)));
                done
            }
            (_, "()V" | "(Ljava/lang/String;)V") if self.resolver.is_assignable(THROWABLE, owner) => {
                if let Some(&message) = args.get(1) {
                    self.set_field(r, THROWABLE, MESSAGE, message);
                }
                done
            }
            _ => Err(unsupported(owner, "<init>", desc)),
        }
    }

    fn static_intrinsic(&mut self, owner: &str, name: &str, desc: &str, args: &[Value]) -> InterpResult<Flow> {
        let value = match (owner, name, desc) {
            ("java/lang/Integer", "rotateLeft", "(II)I") => {
                Value::Int(int_arg(args, 0).rotate_left(int_arg(args, 1) as u32 & 31))
            }
            ("java/lang/Integer", "rotateRight", "(II)I") => {
                Value::Int(int_arg(args, 0).rotate_right(int_arg(args, 1) as u32 & 31))
            }
            ("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;") => {
                Value::Ref(self.heap.alloc(HeapObject::Boxed(int_arg(args, 0))))
            }
            ("java/lang/Integer", "toString", "(I)Ljava/lang/String;")
            | ("java/lang/String", "valueOf", "(I)Ljava/lang/String;") => {
                self.string_value(int_arg(args, 0).to_string())
            }
            ("java/lang/String", "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;") => {
                let text = self.heap.display(args[0]);
                self.string_value(text)
            }
            ("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I") => {
                let Some(s) = self.text_of(args[0]) else {
                    let t = self.raise("java/lang/NumberFormatException", Some("Cannot parse null string: null"));
                    return Ok(Flow::Throw(t));
                };
                match s.parse::<i32>() {
                    Ok(v) => Value::Int(v),
                    Err(_) => {
                        let message = format!("For input string: \"{s}\"");
                        return Ok(Flow::Throw(
                            self.raise("java/lang/NumberFormatException", Some(&message)),
                        ));
                    }
                }
            }
            ("java/lang/Math", "abs", "(I)I") => Value::Int(int_arg(args, 0).wrapping_abs()),
            ("java/lang/Math", "max", "(II)I") => Value::Int(int_arg(args, 0).max(int_arg(args, 1))),
            ("java/lang/Math", "min", "(II)I") => Value::Int(int_arg(args, 0).min(int_arg(args, 1))),
            ("java/lang/System", "nanoTime" | "currentTimeMillis", "()J") => {
                self.clock = self.clock.wrapping_add(self.config.nano_time_step);
                Value::Long(self.clock)
            }
            _ => return Err(unsupported(owner, name, desc)),
        };
        Ok(Flow::Return(Some(value)))
    }

    fn virtual_intrinsic(&mut self, owner: &str, name: &str, desc: &str, args: &[Value]) -> InterpResult<Flow> {
        let Some(&Value::Ref(r)) = args.first() else {
            return Err(unsupported(owner, name, desc));
        };
        let returned = |v: Value| -> InterpResult<Flow> { Ok(Flow::Return(Some(v))) };

        match (name, desc) {
            ("hashCode", "()I") => {
                let h = match self.heap.get(r) {
                    HeapObject::Str(s) => Heap::string_hash(s),
                    HeapObject::Boxed(v) => *v,
                    _ => Heap::identity_hash(r),
                };
                returned(Value::Int(h))
            }
            ("equals", "(Ljava/lang/Object;)Z") => {
                let same = match (self.heap.get(r), args[1]) {
                    (_, Value::Ref(o)) if o == r => true,
                    (HeapObject::Str(a), Value::Ref(o)) => {
                        matches!(self.heap.get(o), HeapObject::Str(b) if a == b)
                    }
                    (HeapObject::Boxed(a), Value::Ref(o)) => {
                        matches!(self.heap.get(o), HeapObject::Boxed(b) if a == b)
                    }
                    _ => false,
                };
                returned(Value::Int(i32::from(same)))
            }
            ("toString", "()Ljava/lang/String;") => {
                if matches!(self.heap.get(r), HeapObject::Str(_)) {
                    return returned(Value::Ref(r));
                }
                let text = if self.is_instance(r, THROWABLE) {
                    self.throwable_text(r)
                } else {
                    self.heap.display(Value::Ref(r))
                };
                returned(self.string_value(text))
            }
            ("getMessage" | "getLocalizedMessage", "()Ljava/lang/String;") if self.is_instance(r, THROWABLE) => {
                returned(self.get_field(r, THROWABLE, MESSAGE).unwrap_or(Value::Null))
            }
            ("length", "()I") => match self.heap.get(r) {
                HeapObject::Str(s) | HeapObject::Builder(s) => {
                    returned(Value::Int(s.encode_utf16().count() as i32))
                }
                _ => Err(unsupported(owner, name, desc)),
            },
            ("charAt", "(I)C") => {
                let index = int_arg(args, 1);
                let unit = match self.heap.get(r) {
                    HeapObject::Str(s) | HeapObject::Builder(s) => {
                        let units: Vec<u16> = s.encode_utf16().collect();
                        usize::try_from(index)
                            .ok()
                            .and_then(|i| units.get(i).copied())
                            .ok_or(units.len())
                    }
                    _ => return Err(unsupported(owner, name, desc)),
                };
                match unit {
                    Ok(c) => returned(Value::Int(i32::from(c))),
                    Err(len) => {
                        let message = format!("Index {index} out of bounds for length {len}");
                        Ok(Flow::Throw(self.raise(
                            "java/lang/StringIndexOutOfBoundsException",
                            Some(&message),
                        )))
                    }
                }
            }
            ("intValue", "()I") => match self.heap.get(r) {
                HeapObject::Boxed(v) => returned(Value::Int(*v)),
                _ => Err(unsupported(owner, name, desc)),
            },
            ("append", _) if matches!(self.heap.get(r), HeapObject::Builder(_)) => {
                let piece = match desc {
                    "(C)Ljava/lang/StringBuilder;" => {
                        char::from_u32(int_arg(args, 1) as u32).map_or_else(String::new, String::from)
                    }
                    "(Z)Ljava/lang/StringBuilder;" => (int_arg(args, 1) != 0).to_string(),
                    _ => self.heap.display(args[1]),
                };
                if let HeapObject::Builder(s) = self.heap.get_mut(r) {
                    s.push_str(&piece);
                }
                returned(Value::Ref(r))
            }
            ("print" | "println", _) if self.heap.get(r).class_name() == "java/io/PrintStream" => {
                let text = match (desc, args.get(1)) {
                    ("()V", _) | (_, None) => String::new(),
                    ("(C)V", Some(Value::Int(c))) => {
                        char::from_u32(*c as u32).map_or_else(String::new, String::from)
                    }
                    ("(Z)V", Some(Value::Int(b))) => (*b != 0).to_string(),
                    (_, Some(v)) => self.heap.display(*v),
                };
                self.pending.push_str(&text);
                if name == "println" {
                    let line = std::mem::take(&mut self.pending);
                    self.output.push(line);
                }
                Ok(Flow::Return(None))
            }
            _ => Err(unsupported(owner, name, desc)),
        }
    }

    /// `Throwable.toString`: the dotted type name, then `: message` if present.
    fn throwable_text(&self, r: Ref) -> String {
        let class = self.heap.get(r).class_name().replace('/', ".");
        match self.get_field(r, THROWABLE, MESSAGE).and_then(|m| self.text_of(m)) {
            Some(message) => format!("{class}: {message}"),
            None => class,
        }
    }
}
