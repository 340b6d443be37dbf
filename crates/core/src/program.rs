//! In-memory program: every decoded type keyed by its internal name.

use crate::access::AccessFlags;
use crate::insn::{Instruction, Label, LabelAllocator};
use crate::manifest::Manifest;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Internal name of the universal root type.
pub const OBJECT: &str = "java/lang/Object";

/// Class-file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl Default for ClassVersion {
    fn default() -> Self {
        // Java 8
        Self {
            major: 52,
            minor: 0,
        }
    }
}

/// Protected range of a method body together with its handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRegion {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// `None` catches anything.
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub desc: String,
    pub access: AccessFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub desc: String,
    pub access: AccessFlags,
    pub max_locals: u16,
    pub max_stack: u16,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub exception_regions: Vec<ExceptionRegion>,
}

impl MethodDef {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    pub const fn has_body(&self) -> bool {
        !self.access.contains(AccessFlags::ABSTRACT) && !self.access.contains(AccessFlags::NATIVE)
    }

    /// Number of executable instructions, ignoring label markers.
    pub fn instruction_count(&self) -> usize {
        self.instructions.iter().filter(|i| !i.is_marker()).count()
    }

    /// An allocator positioned past every label used in the body or its regions.
    pub fn label_allocator(&self) -> LabelAllocator {
        let mut highest = None::<u32>;
        let mut note = |l: Label| highest = Some(highest.map_or(l.0, |h| h.max(l.0)));
        for insn in &self.instructions {
            if let Instruction::Label(l) = insn {
                note(*l);
            }
            for t in insn.targets() {
                note(t);
            }
        }
        for r in &self.exception_regions {
            note(r.start);
            note(r.end);
            note(r.handler);
        }
        LabelAllocator::starting_at(highest.map_or(0, |h| h + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    /// Absent only for the universal root type.
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    pub access: AccessFlags,
    #[serde(default)]
    pub version: ClassVersion,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// A public class extending the universal root, with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: Some(OBJECT.to_string()),
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            version: ClassVersion::default(),
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub const fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    pub fn is_module_descriptor(&self) -> bool {
        self.access.contains(AccessFlags::MODULE)
            || self.name == "module-info"
            || self.name.ends_with("/module-info")
    }

    pub fn find_method(&self, name: &str, desc: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.desc == desc)
    }

    pub fn find_field(&self, name: &str, desc: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name && f.desc == desc)
    }

    /// Raises the format version to at least `major`; never lowers it.
    pub fn require_version(&mut self, major: u16) {
        if self.version.major < major {
            self.version = ClassVersion { major, minor: 0 };
        }
    }

    /// Raises the version to what the method bodies need.
    pub fn require_code_version(&mut self) {
        let needed = self
            .methods
            .iter()
            .flat_map(|m| &m.instructions)
            .map(Instruction::min_version)
            .max();
        if let Some(major) = needed {
            self.require_version(major);
        }
    }

    /// Simple name: the part after the last package separator.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// All types of the archive being rewritten. Keys always equal the type's own name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    types: IndexMap<String, TypeDef>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a type under its own name, returning any definition it replaced.
    pub fn insert(&mut self, ty: TypeDef) -> Option<TypeDef> {
        self.types.insert(ty.name.clone(), ty)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn types_mut(&mut self) -> impl Iterator<Item = &mut TypeDef> {
        self.types.values_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl FromIterator<TypeDef> for Program {
    fn from_iter<I: IntoIterator<Item = TypeDef>>(iter: I) -> Self {
        let mut program = Self::new();
        for ty in iter {
            program.insert(ty);
        }
        program
    }
}

impl IntoIterator for Program {
    type Item = TypeDef;
    type IntoIter = indexmap::map::IntoValues<String, TypeDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.into_values()
    }
}

/// The program together with the manifest that travels with it through the passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramBundle {
    pub program: Program,
    pub manifest: Manifest,
}

impl ProgramBundle {
    pub const fn new(program: Program, manifest: Manifest) -> Self {
        Self { program, manifest }
    }
}
