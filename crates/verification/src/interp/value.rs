//! Runtime values and the object heap.

use classcloak_core::insn::ArrayKind;
use classcloak_core::OBJECT;
use std::collections::HashMap;

/// Index into the heap.
pub type Ref = usize;

/// One operand-stack entry or local slot. Wide values occupy a single entry;
/// the upper half of a wide local is [`Value::Top`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(Ref),
    /// Unusable slot.
    Top,
}

impl Value {
    /// Stack slots the value occupies.
    pub const fn size(self) -> usize {
        match self {
            Self::Long(_) | Self::Double(_) => 2,
            _ => 1,
        }
    }

    /// The zero value for a field or array element of descriptor `desc`.
    pub fn default_for(desc: &str) -> Self {
        match desc.as_bytes().first() {
            Some(b'J') => Self::Long(0),
            Some(b'F') => Self::Float(0.0),
            Some(b'D') => Self::Double(0.0),
            Some(b'L' | b'[') => Self::Null,
            _ => Self::Int(0),
        }
    }
}

/// Element layout of an array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elements {
    Primitive(ArrayKind),
    Reference,
}

impl Elements {
    pub const fn descriptor_char(self) -> char {
        match self {
            Self::Primitive(kind) => match kind {
                ArrayKind::Boolean => 'Z',
                ArrayKind::Char => 'C',
                ArrayKind::Float => 'F',
                ArrayKind::Double => 'D',
                ArrayKind::Byte => 'B',
                ArrayKind::Short => 'S',
                ArrayKind::Int => 'I',
                ArrayKind::Long => 'J',
            },
            Self::Reference => 'L',
        }
    }

    pub const fn zero(self) -> Value {
        match self {
            Self::Primitive(ArrayKind::Long) => Value::Long(0),
            Self::Primitive(ArrayKind::Float) => Value::Float(0.0),
            Self::Primitive(ArrayKind::Double) => Value::Double(0.0),
            Self::Primitive(_) => Value::Int(0),
            Self::Reference => Value::Null,
        }
    }

    /// Narrows an int stored into a sub-int array.
    pub const fn narrow(self, value: Value) -> Value {
        match (self, value) {
            (Self::Primitive(ArrayKind::Boolean), Value::Int(v)) => Value::Int(v & 1),
            (Self::Primitive(ArrayKind::Byte), Value::Int(v)) => Value::Int(v as i8 as i32),
            (Self::Primitive(ArrayKind::Char), Value::Int(v)) => Value::Int(v as u16 as i32),
            (Self::Primitive(ArrayKind::Short), Value::Int(v)) => Value::Int(v as i16 as i32),
            _ => value,
        }
    }
}

/// Array element kind for a `newarray` or a one-dimensional descriptor.
pub fn elements_of(desc: &str) -> Elements {
    let kind = match desc.trim_start_matches('[').as_bytes().first() {
        Some(b'Z') if desc.len() == 2 => ArrayKind::Boolean,
        Some(b'C') if desc.len() == 2 => ArrayKind::Char,
        Some(b'F') if desc.len() == 2 => ArrayKind::Float,
        Some(b'D') if desc.len() == 2 => ArrayKind::Double,
        Some(b'B') if desc.len() == 2 => ArrayKind::Byte,
        Some(b'S') if desc.len() == 2 => ArrayKind::Short,
        Some(b'I') if desc.len() == 2 => ArrayKind::Int,
        Some(b'J') if desc.len() == 2 => ArrayKind::Long,
        _ => return Elements::Reference,
    };
    Elements::Primitive(kind)
}

/// Heap cells. Platform objects with behaviour of their own get dedicated
/// variants; everything else is an [`HeapObject::Instance`].
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// Instance of a program type or a plain platform type such as an exception.
    Instance {
        class: String,
        /// Keyed by (declaring type, field name).
        fields: HashMap<(String, String), Value>,
    },
    Str(String),
    Builder(String),
    Boxed(i32),
    Array {
        /// Array type descriptor, e.g. `[I`.
        desc: String,
        elements: Elements,
        values: Vec<Value>,
    },
    /// Type literal.
    Class(String),
}

impl HeapObject {
    /// Runtime type name used for casts and handler matching.
    pub fn class_name(&self) -> &str {
        match self {
            Self::Instance { class, .. } => class,
            Self::Str(_) => "java/lang/String",
            Self::Builder(_) => "java/lang/StringBuilder",
            Self::Boxed(_) => "java/lang/Integer",
            Self::Array { desc, .. } => desc,
            Self::Class(_) => "java/lang/Class",
        }
    }
}

/// Append-only object store with interned string literals.
#[derive(Debug, Default)]
pub struct Heap {
    cells: Vec<HeapObject>,
    interned: HashMap<String, Ref>,
}

impl Heap {
    pub fn alloc(&mut self, obj: HeapObject) -> Ref {
        self.cells.push(obj);
        self.cells.len() - 1
    }

    /// The shared object for a string literal.
    pub fn intern(&mut self, s: &str) -> Ref {
        if let Some(&r) = self.interned.get(s) {
            return r;
        }
        let r = self.alloc(HeapObject::Str(s.to_string()));
        self.interned.insert(s.to_string(), r);
        r
    }

    pub fn get(&self, r: Ref) -> &HeapObject {
        &self.cells[r]
    }

    pub fn get_mut(&mut self, r: Ref) -> &mut HeapObject {
        &mut self.cells[r]
    }

    pub fn replace(&mut self, r: Ref, obj: HeapObject) {
        self.cells[r] = obj;
    }

    pub fn new_instance(&mut self, class: &str) -> Ref {
        self.alloc(HeapObject::Instance {
            class: class.to_string(),
            fields: HashMap::new(),
        })
    }

    /// Identity hash: stable per object within one run.
    pub fn identity_hash(r: Ref) -> i32 {
        (r as i32).wrapping_mul(0x61c8_8647_u32 as i32) & i32::MAX
    }

    /// `String.hashCode` over UTF-16 units.
    pub fn string_hash(s: &str) -> i32 {
        s.encode_utf16()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)))
    }

    /// Text form of a value, as `String.valueOf` would print it.
    pub fn display(&self, value: Value) -> String {
        match value {
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => format!("{v:?}"),
            Value::Double(v) => format!("{v:?}"),
            Value::Null | Value::Top => "null".to_string(),
            Value::Ref(r) => match self.get(r) {
                HeapObject::Str(s) | HeapObject::Builder(s) => s.clone(),
                HeapObject::Boxed(v) => v.to_string(),
                HeapObject::Class(name) => format!("class {}", name.replace('/', ".")),
                obj => {
                    let name = obj.class_name();
                    let name = if name == OBJECT { "java.lang.Object".to_string() } else { name.replace('/', ".") };
                    format!("{}@{:x}", name, Self::identity_hash(r))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_matches_array_kind() {
        let bytes = elements_of("[B");
        assert_eq!(bytes.narrow(Value::Int(0x1ff)), Value::Int(-1));
        assert_eq!(elements_of("[C").narrow(Value::Int(-1)), Value::Int(0xffff));
        assert_eq!(elements_of("[Z").narrow(Value::Int(2)), Value::Int(0));
        assert_eq!(elements_of("[[I"), Elements::Reference);
        assert_eq!(elements_of("[Ljava/lang/String;"), Elements::Reference);
    }

    #[test]
    fn literals_are_interned() {
        let mut heap = Heap::default();
        let a = heap.intern("x");
        let b = heap.intern("x");
        let c = heap.alloc(HeapObject::Str("x".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Heap::string_hash("ab"), 97 * 31 + 98);
    }
}
