//! Field and method descriptor parsing.
//!
//! Descriptors use the compact class-file grammar: `I`, `J`, `Lpkg/Type;`,
//! `[I` for fields and `(IJ)V` for methods.

use classcloak_utils::errors::DescriptorError;
use serde::{Deserialize, Serialize};

/// A parsed field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Internal name of a class or interface.
    Object(String),
    Array(Box<FieldType>),
}

/// The category of value a method returns, as far as the stack is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnKind {
    Void,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `V`.
    pub ret: Option<FieldType>,
}

impl FieldType {
    /// Parses a complete field descriptor.
    pub fn parse(desc: &str) -> Result<Self, DescriptorError> {
        let (ty, used) = Self::parse_prefix(desc, 0)?;
        if used != desc.len() {
            return Err(DescriptorError::Trailing(desc.to_string()));
        }
        Ok(ty)
    }

    /// Parses one type starting at byte offset `at`, returning it and the offset after it.
    fn parse_prefix(desc: &str, at: usize) -> Result<(Self, usize), DescriptorError> {
        let bytes = desc.as_bytes();
        let Some(&head) = bytes.get(at) else {
            return Err(if desc.is_empty() {
                DescriptorError::Empty
            } else {
                DescriptorError::Malformed {
                    desc: desc.to_string(),
                    offset: at,
                }
            });
        };
        let simple = match head {
            b'B' => Some(Self::Byte),
            b'C' => Some(Self::Char),
            b'D' => Some(Self::Double),
            b'F' => Some(Self::Float),
            b'I' => Some(Self::Int),
            b'J' => Some(Self::Long),
            b'S' => Some(Self::Short),
            b'Z' => Some(Self::Boolean),
            _ => None,
        };
        if let Some(ty) = simple {
            return Ok((ty, at + 1));
        }
        match head {
            b'L' => {
                let end = desc[at..].find(';').map(|i| at + i).ok_or_else(|| {
                    DescriptorError::Malformed {
                        desc: desc.to_string(),
                        offset: at,
                    }
                })?;
                if end == at + 1 {
                    return Err(DescriptorError::Malformed {
                        desc: desc.to_string(),
                        offset: at,
                    });
                }
                Ok((Self::Object(desc[at + 1..end].to_string()), end + 1))
            }
            b'[' => {
                let (inner, next) = Self::parse_prefix(desc, at + 1)?;
                Ok((Self::Array(Box::new(inner)), next))
            }
            _ => Err(DescriptorError::Malformed {
                desc: desc.to_string(),
                offset: at,
            }),
        }
    }

    /// Number of local-variable slots a value of this type occupies.
    pub const fn slot_size(&self) -> u16 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    pub const fn is_wide(&self) -> bool {
        self.slot_size() == 2
    }

    pub const fn return_kind(&self) -> ReturnKind {
        match self {
            Self::Long => ReturnKind::Long,
            Self::Float => ReturnKind::Float,
            Self::Double => ReturnKind::Double,
            Self::Object(_) | Self::Array(_) => ReturnKind::Reference,
            _ => ReturnKind::Int,
        }
    }

    /// Renders the type back into descriptor form.
    pub fn to_descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            Self::Byte => out.push('B'),
            Self::Char => out.push('C'),
            Self::Double => out.push('D'),
            Self::Float => out.push('F'),
            Self::Int => out.push('I'),
            Self::Long => out.push('J'),
            Self::Short => out.push('S'),
            Self::Boolean => out.push('Z'),
            Self::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            Self::Array(inner) => {
                out.push('[');
                inner.write_descriptor(out);
            }
        }
    }
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Result<Self, DescriptorError> {
        if !desc.starts_with('(') {
            return Err(DescriptorError::NotMethod(desc.to_string()));
        }
        let mut at = 1;
        let mut params = Vec::new();
        loop {
            match desc.as_bytes().get(at) {
                Some(b')') => break,
                Some(_) => {
                    let (ty, next) = FieldType::parse_prefix(desc, at)?;
                    params.push(ty);
                    at = next;
                }
                None => return Err(DescriptorError::NotMethod(desc.to_string())),
            }
        }
        let ret_desc = &desc[at + 1..];
        let ret = if ret_desc == "V" {
            None
        } else {
            Some(FieldType::parse(ret_desc)?)
        };
        Ok(Self { params, ret })
    }

    /// Total slots taken by the parameters, excluding the receiver.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_size).sum()
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.ret
            .as_ref()
            .map_or(ReturnKind::Void, FieldType::return_kind)
    }

    pub fn to_descriptor(&self) -> String {
        let mut out = String::from("(");
        for p in &self.params {
            p.write_descriptor(&mut out);
        }
        out.push(')');
        match &self.ret {
            Some(ty) => ty.write_descriptor(&mut out),
            None => out.push('V'),
        }
        out
    }
}

/// Rewrites every `Lname;` reference inside a field or method descriptor.
///
/// The text is scanned lexically so this works for both descriptor kinds and
/// leaves malformed input untouched rather than failing.
pub fn remap_descriptor(desc: &str, map: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(';') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &tail[..end];
        out.push('L');
        match map(name) {
            Some(mapped) => out.push_str(&mapped),
            None => out.push_str(name),
        }
        out.push(';');
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_descriptor() {
        let md = MethodDescriptor::parse("(I[JLjava/lang/String;D)Ljava/lang/Object;").unwrap();
        assert_eq!(md.params.len(), 4);
        assert_eq!(md.param_slots(), 1 + 1 + 1 + 2);
        assert_eq!(md.return_kind(), ReturnKind::Reference);
        assert_eq!(
            md.to_descriptor(),
            "(I[JLjava/lang/String;D)Ljava/lang/Object;"
        );
    }

    #[test]
    fn void_and_wide_returns() {
        assert_eq!(
            MethodDescriptor::parse("()V").unwrap().return_kind(),
            ReturnKind::Void
        );
        assert_eq!(
            MethodDescriptor::parse("(Z)J").unwrap().return_kind(),
            ReturnKind::Long
        );
        assert_eq!(
            MethodDescriptor::parse("(C)S").unwrap().return_kind(),
            ReturnKind::Int
        );
    }

    #[test]
    fn rejects_malformed() {
        assert!(FieldType::parse("").is_err());
        assert!(FieldType::parse("Lfoo").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
    }

    #[test]
    fn remaps_class_references() {
        let out = remap_descriptor("(Lpkg/A;[Lpkg/B;I)Lpkg/A;", |n| match n {
            "pkg/A" => Some("a".to_string()),
            _ => None,
        });
        assert_eq!(out, "(La;[Lpkg/B;I)La;");
    }
}
