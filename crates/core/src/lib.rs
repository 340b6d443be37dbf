//! In-memory model of a compiled program archive: types, members, instructions,
//! descriptors and keep rules, plus the hierarchy resolver, the structural
//! remapper, label validation and container I/O built on top of it.

pub mod access;
pub mod archive;
pub mod codec;
pub mod descriptor;
pub mod hierarchy;
pub mod insn;
pub mod keep;
pub mod manifest;
pub mod program;
pub mod remap;
pub mod validate;

pub use access::AccessFlags;
pub use insn::{Instruction, Label};
pub use program::{OBJECT, Program, ProgramBundle, TypeDef};
