use super::value::{Ref, Value};
use super::InterpResult;
use classcloak_core::insn::JumpCond;
use classcloak_utils::errors::VerificationError;

/// Locals and operand stack of one activation.
pub(super) struct Frame<'c> {
    context: &'c str,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl<'c> Frame<'c> {
    /// Lays the arguments out from slot 0, wide values taking two slots.
    pub(super) fn new(context: &'c str, max_locals: u16, args: Vec<Value>) -> Self {
        let needed: usize = args.iter().map(|a| a.size()).sum();
        let mut locals = vec![Value::Top; needed.max(usize::from(max_locals))];
        let mut slot = 0;
        for arg in args {
            locals[slot] = arg;
            slot += arg.size();
        }
        Self {
            context,
            locals,
            stack: Vec::new(),
        }
    }

    pub(super) fn malformed(&self, reason: &str) -> VerificationError {
        VerificationError::Malformed {
            method: self.context.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(super) fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    pub(super) fn push_all(&mut self, vs: &[Value]) {
        self.stack.extend_from_slice(vs);
    }

    pub(super) fn pop(&mut self) -> InterpResult<Value> {
        self.stack.pop().ok_or_else(|| self.malformed("operand stack underflow"))
    }

    pub(super) fn peek(&self) -> InterpResult<Value> {
        self.stack.last().copied().ok_or_else(|| self.malformed("operand stack underflow"))
    }

    /// Pops values covering exactly `slots` stack slots, returned bottom first.
    pub(super) fn pop_slots(&mut self, slots: usize) -> InterpResult<Vec<Value>> {
        let mut taken = Vec::with_capacity(slots);
        let mut size = 0;
        while size < slots {
            let v = self.pop()?;
            size += v.size();
            taken.push(v);
        }
        if size != slots {
            return Err(self.malformed("stack operation splits a wide value"));
        }
        taken.reverse();
        Ok(taken)
    }

    /// Handler entry: the stack holds only the exception.
    pub(super) fn catch(&mut self, exception: Value) {
        self.stack.clear();
        self.stack.push(exception);
    }

    pub(super) fn pop_int(&mut self) -> InterpResult<i32> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(self.malformed(&format!("expected int, found {other:?}"))),
        }
    }

    pub(super) fn pop_long(&mut self) -> InterpResult<i64> {
        match self.pop()? {
            Value::Long(v) => Ok(v),
            other => Err(self.malformed(&format!("expected long, found {other:?}"))),
        }
    }

    pub(super) fn pop_float(&mut self) -> InterpResult<f32> {
        match self.pop()? {
            Value::Float(v) => Ok(v),
            other => Err(self.malformed(&format!("expected float, found {other:?}"))),
        }
    }

    pub(super) fn pop_double(&mut self) -> InterpResult<f64> {
        match self.pop()? {
            Value::Double(v) => Ok(v),
            other => Err(self.malformed(&format!("expected double, found {other:?}"))),
        }
    }

    /// `None` for null.
    pub(super) fn pop_ref(&mut self) -> InterpResult<Option<Ref>> {
        match self.pop()? {
            Value::Ref(r) => Ok(Some(r)),
            Value::Null => Ok(None),
            other => Err(self.malformed(&format!("expected reference, found {other:?}"))),
        }
    }

    pub(super) fn int_op(&mut self, f: impl Fn(i32, i32) -> i32) -> InterpResult<()> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Value::Int(f(a, b)));
        Ok(())
    }

    pub(super) fn long_op(&mut self, f: impl Fn(i64, i64) -> i64) -> InterpResult<()> {
        let b = self.pop_long()?;
        let a = self.pop_long()?;
        self.push(Value::Long(f(a, b)));
        Ok(())
    }

    pub(super) fn float_op(&mut self, f: impl Fn(f32, f32) -> f32) -> InterpResult<()> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Value::Float(f(a, b)));
        Ok(())
    }

    pub(super) fn double_op(&mut self, f: impl Fn(f64, f64) -> f64) -> InterpResult<()> {
        let b = self.pop_double()?;
        let a = self.pop_double()?;
        self.push(Value::Double(f(a, b)));
        Ok(())
    }

    pub(super) fn load(&self, slot: u16) -> InterpResult<Value> {
        match self.locals.get(usize::from(slot)) {
            Some(Value::Top) | None => Err(self.malformed(&format!("slot {slot} read before it was written"))),
            Some(v) => Ok(*v),
        }
    }

    pub(super) fn store(&mut self, slot: u16, v: Value) -> InterpResult<()> {
        let slot = usize::from(slot);
        if slot + v.size() > self.locals.len() {
            return Err(self.malformed(&format!("slot {slot} beyond max locals")));
        }
        self.locals[slot] = v;
        if v.size() == 2 {
            self.locals[slot + 1] = Value::Top;
        }
        Ok(())
    }

    /// Pops the operands of a jump and decides it.
    pub(super) fn branch(&mut self, cond: JumpCond) -> InterpResult<bool> {
        use JumpCond::*;
        Ok(match cond {
            Goto => true,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => {
                let v = self.pop_int()?;
                match cond {
                    IfEq => v == 0,
                    IfNe => v != 0,
                    IfLt => v < 0,
                    IfGe => v >= 0,
                    IfGt => v > 0,
                    _ => v <= 0,
                }
            }
            IfICmpEq | IfICmpNe | IfICmpLt | IfICmpGe | IfICmpGt | IfICmpLe => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                match cond {
                    IfICmpEq => a == b,
                    IfICmpNe => a != b,
                    IfICmpLt => a < b,
                    IfICmpGe => a >= b,
                    IfICmpGt => a > b,
                    _ => a <= b,
                }
            }
            IfACmpEq | IfACmpNe => {
                let b = self.pop_ref()?;
                let a = self.pop_ref()?;
                (a == b) == (cond == IfACmpEq)
            }
            IfNull => self.pop_ref()?.is_none(),
            IfNonNull => self.pop_ref()?.is_some(),
        })
    }
}
