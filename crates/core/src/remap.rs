//! Structural remapping: rebuilds a program with every name reference passed
//! through a [`Remapper`].
//!
//! All remapper queries use the names of the *input* program, so a rename table
//! computed up front can be applied in one sweep and the result inserted as a
//! brand-new map.

use crate::descriptor::remap_descriptor;
use crate::insn::{Constant, Handle, Instruction};
use crate::program::{ExceptionRegion, FieldDef, MethodDef, Program, TypeDef};

/// Supplies new names. `None` keeps the original.
pub trait Remapper {
    fn map_type(&self, _internal_name: &str) -> Option<String> {
        None
    }

    fn map_method_name(&self, _owner: &str, _name: &str, _desc: &str) -> Option<String> {
        None
    }

    fn map_field_name(&self, _owner: &str, _name: &str, _desc: &str) -> Option<String> {
        None
    }
}

/// Applies a remapper to names, descriptors and every operand of a program.
struct Sweep<'r> {
    remapper: &'r dyn Remapper,
}

impl Sweep<'_> {
    fn desc(&self, desc: &str) -> String {
        remap_descriptor(desc, |n| self.remapper.map_type(n))
    }

    /// Type operands are internal names, except for arrays, which are descriptors.
    fn type_name(&self, name: &str) -> String {
        if name.starts_with('[') {
            self.desc(name)
        } else {
            self.remapper
                .map_type(name)
                .unwrap_or_else(|| name.to_string())
        }
    }

    fn handle(&self, h: &Handle) -> Handle {
        // Kinds 1..=4 reference fields, the rest methods.
        let name = if h.kind <= 4 {
            self.remapper.map_field_name(&h.owner, &h.name, &h.desc)
        } else {
            self.remapper.map_method_name(&h.owner, &h.name, &h.desc)
        };
        Handle {
            kind: h.kind,
            owner: self.type_name(&h.owner),
            name: name.unwrap_or_else(|| h.name.clone()),
            desc: self.desc(&h.desc),
            interface: h.interface,
        }
    }

    fn constant(&self, c: &Constant) -> Constant {
        match c {
            Constant::Type(t) => Constant::Type(self.type_name(t)),
            Constant::MethodType(d) => Constant::MethodType(self.desc(d)),
            Constant::Handle(h) => Constant::Handle(self.handle(h)),
            other => other.clone(),
        }
    }

    fn instruction(&self, insn: &Instruction) -> Instruction {
        match insn {
            Instruction::Const(c) => Instruction::Const(self.constant(c)),
            Instruction::Type { op, ty } => Instruction::Type {
                op: *op,
                ty: self.type_name(ty),
            },
            Instruction::MultiANewArray { desc, dims } => Instruction::MultiANewArray {
                desc: self.desc(desc),
                dims: *dims,
            },
            Instruction::Field {
                op,
                owner,
                name,
                desc,
            } => Instruction::Field {
                op: *op,
                owner: self.type_name(owner),
                name: self
                    .remapper
                    .map_field_name(owner, name, desc)
                    .unwrap_or_else(|| name.clone()),
                desc: self.desc(desc),
            },
            Instruction::Invoke {
                kind,
                owner,
                name,
                desc,
                interface,
            } => Instruction::Invoke {
                kind: *kind,
                owner: self.type_name(owner),
                name: self
                    .remapper
                    .map_method_name(owner, name, desc)
                    .unwrap_or_else(|| name.clone()),
                desc: self.desc(desc),
                interface: *interface,
            },
            Instruction::InvokeDynamic {
                name,
                desc,
                bootstrap,
                args,
            } => Instruction::InvokeDynamic {
                name: name.clone(),
                desc: self.desc(desc),
                bootstrap: self.handle(bootstrap),
                args: args.iter().map(|a| self.constant(a)).collect(),
            },
            other => other.clone(),
        }
    }

    fn field(&self, owner: &str, f: &FieldDef) -> FieldDef {
        FieldDef {
            name: self
                .remapper
                .map_field_name(owner, &f.name, &f.desc)
                .unwrap_or_else(|| f.name.clone()),
            desc: self.desc(&f.desc),
            access: f.access,
        }
    }

    fn method(&self, owner: &str, m: &MethodDef) -> MethodDef {
        MethodDef {
            name: self
                .remapper
                .map_method_name(owner, &m.name, &m.desc)
                .unwrap_or_else(|| m.name.clone()),
            desc: self.desc(&m.desc),
            access: m.access,
            max_locals: m.max_locals,
            max_stack: m.max_stack,
            instructions: m.instructions.iter().map(|i| self.instruction(i)).collect(),
            exception_regions: m
                .exception_regions
                .iter()
                .map(|r| ExceptionRegion {
                    catch_type: r.catch_type.as_deref().map(|t| self.type_name(t)),
                    ..r.clone()
                })
                .collect(),
        }
    }

    fn type_def(&self, ty: &TypeDef) -> TypeDef {
        TypeDef {
            name: self.type_name(&ty.name),
            super_name: ty.super_name.as_deref().map(|s| self.type_name(s)),
            interfaces: ty.interfaces.iter().map(|i| self.type_name(i)).collect(),
            access: ty.access,
            version: ty.version,
            source_file: ty.source_file.clone(),
            fields: ty.fields.iter().map(|f| self.field(&ty.name, f)).collect(),
            methods: ty.methods.iter().map(|m| self.method(&ty.name, m)).collect(),
        }
    }
}

/// Remaps a single type definition.
pub fn remap_type(ty: &TypeDef, remapper: &dyn Remapper) -> TypeDef {
    Sweep { remapper }.type_def(ty)
}

/// Builds a new program with every type passed through the remapper; the
/// result is keyed by the new names.
pub fn remap_program(program: &Program, remapper: &dyn Remapper) -> Program {
    let sweep = Sweep { remapper };
    program.types().map(|ty| sweep.type_def(ty)).collect()
}
