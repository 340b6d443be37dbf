use crate::names::NameGenerator;
use crate::{PassConfig, Transform};
use classcloak_core::insn::{Constant, Instruction};
use classcloak_core::remap::{Remapper, remap_program};
use classcloak_core::{Program, ProgramBundle};
use classcloak_utils::errors::TransformError;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use std::collections::HashSet;
use tracing::debug;

/// Fields the serialization machinery looks up by name.
const SERIAL_FIELDS: [&str; 2] = ["serialVersionUID", "serialPersistentFields"];

/// Renames fields. One generator serves the whole run, so two field identities
/// never end up with the same name.
pub struct FieldRename {
    config: PassConfig,
}

impl FieldRename {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }
}

/// Finds the type declaring `name:desc` as seen from `owner`: the owner itself,
/// then its interfaces, then its superclass. Resolution stops at the program
/// boundary.
fn resolve_field<'p>(program: &'p Program, owner: &str, name: &str, desc: &str) -> Option<&'p str> {
    fn lookup<'p>(
        program: &'p Program,
        owner: &str,
        name: &str,
        desc: &str,
        seen: &mut HashSet<String>,
    ) -> Option<&'p str> {
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
        let sup = ty.super_name.as_deref()?;
        lookup(program, sup, name, desc, seen)
    }
    lookup(program, owner, name, desc, &mut HashSet::new())
}

struct FieldTable<'p> {
    program: &'p Program,
    /// (declaring owner, original name) -> new name
    names: IndexMap<(String, String), String>,
}

impl Remapper for FieldTable<'_> {
    fn map_field_name(&self, owner: &str, name: &str, desc: &str) -> Option<String> {
        let declaring = resolve_field(self.program, owner, name, desc)?;
        self.names
            .get(&(declaring.to_string(), name.to_string()))
            .cloned()
    }
}

/// Field names referenced in the program that no rename will touch.
fn fixed_field_names(program: &Program, renamable: &IndexMap<(String, String), String>) -> HashSet<String> {
    let mut fixed = HashSet::new();
    let mut note = |owner: &str, name: &str, desc: &str| {
        let resolved = resolve_field(program, owner, name, desc)
            .is_some_and(|d| renamable.contains_key(&(d.to_string(), name.to_string())));
        if !resolved {
            fixed.insert(name.to_string());
        }
    };
    for ty in program.types() {
        for f in &ty.fields {
            note(&ty.name, &f.name, &f.desc);
        }
        for insn in ty.methods.iter().flat_map(|m| m.instructions.iter()) {
            match insn {
                Instruction::Field {
                    owner, name, desc, ..
                } => note(owner, name, desc),
                Instruction::Const(Constant::Handle(h)) if h.kind <= 4 => {
                    note(&h.owner, &h.name, &h.desc);
                }
                _ => {}
            }
        }
    }
    fixed
}

impl Transform for FieldRename {
    fn name(&self) -> &'static str {
        "FieldRename"
    }

    fn apply(&self, bundle: &mut ProgramBundle, _rng: &mut StdRng) -> Result<bool, TransformError> {
        let keep = &self.config.keep;
        let program = &bundle.program;

        // identities first, names once every fixed name is known
        let mut names: IndexMap<(String, String), String> = IndexMap::new();
        for ty in program.types() {
            if ty.is_module_descriptor() || keep.keeps_type(&ty.name) {
                continue;
            }
            for f in &ty.fields {
                if SERIAL_FIELDS.contains(&f.name.as_str()) || keep.keeps_member(&ty.name, &f.name) {
                    continue;
                }
                names.insert((ty.name.clone(), f.name.clone()), String::new());
            }
        }
        if names.is_empty() {
            return Ok(false);
        }

        let fixed = fixed_field_names(program, &names);
        let mut generator = NameGenerator::new();
        for ((owner, name), new_name) in names.iter_mut() {
            *new_name = generator.next_avoiding(|n| fixed.contains(n));
            debug!("field {}.{} -> {}", owner, name, new_name);
        }

        let renamed_ids: HashSet<(String, String)> = names
            .iter()
            .map(|((owner, _), n)| (owner.clone(), n.clone()))
            .collect();
        let table = FieldTable { program, names };
        let mut renamed = remap_program(program, &table);
        for ty in renamed.types_mut() {
            for f in &mut ty.fields {
                if renamed_ids.contains(&(ty.name.clone(), f.name.clone())) {
                    f.access = f.access.widened_to_public();
                }
            }
        }
        bundle.program = renamed;
        Ok(true)
    }
}
