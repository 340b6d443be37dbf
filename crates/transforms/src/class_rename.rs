use crate::names::NameGenerator;
use crate::{PassConfig, Transform};
use classcloak_core::manifest::MAIN_CLASS;
use classcloak_core::remap::{Remapper, remap_program};
use classcloak_core::{Program, ProgramBundle};
use classcloak_utils::errors::TransformError;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Renames every type not protected by a keep rule to a short generated name.
pub struct ClassRename {
    config: PassConfig,
}

impl ClassRename {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }
}

struct ClassTable {
    names: IndexMap<String, String>,
}

impl Remapper for ClassTable {
    fn map_type(&self, internal_name: &str) -> Option<String> {
        self.names.get(internal_name).cloned()
    }
}

impl Transform for ClassRename {
    fn name(&self) -> &'static str {
        "ClassRename"
    }

    fn apply(&self, bundle: &mut ProgramBundle, _rng: &mut StdRng) -> Result<bool, TransformError> {
        let keep = &self.config.keep;
        let program = &bundle.program;

        let fixed: HashSet<&str> = program
            .types()
            .filter(|t| keep.keeps_type(&t.name) || t.is_module_descriptor())
            .map(|t| t.name.as_str())
            .collect();

        let mut generator = NameGenerator::new();
        let mut names = IndexMap::new();
        for ty in program.types().filter(|t| !fixed.contains(t.name.as_str())) {
            let new_name = generator.next_avoiding(|n| fixed.contains(n));
            debug!("class {} -> {}", ty.name, new_name);
            names.insert(ty.name.clone(), new_name);
        }
        if names.is_empty() {
            return Ok(false);
        }

        let table = ClassTable { names };
        let mut renamed = remap_program(program, &table);
        let moved: HashSet<&str> = table.names.values().map(String::as_str).collect();
        let overrides = overrides_of_moved(&renamed, &moved);
        for ty in renamed.types_mut() {
            if moved.contains(ty.name.as_str()) {
                // now alone in the default package
                ty.access = ty.access.widened_to_public();
                if ty.source_file.is_some() {
                    ty.source_file = Some(format!("{}.java", ty.simple_name()));
                }
                for f in ty.fields.iter_mut().filter(|f| !f.access.is_private()) {
                    f.access = f.access.widened_to_public();
                }
                for m in ty
                    .methods
                    .iter_mut()
                    .filter(|m| !m.access.is_private() && m.name != "<clinit>")
                {
                    m.access = m.access.widened_to_public();
                }
            } else if let Some(widen) = overrides.get(ty.name.as_str()) {
                for m in ty.methods.iter_mut().filter(|m| widen.contains(&(m.name.clone(), m.desc.clone()))) {
                    m.access = m.access.widened_to_public();
                }
            }
        }

        if let Some(main) = bundle.manifest.get(MAIN_CLASS) {
            let internal = main.trim().replace('.', "/");
            if let Some(new_name) = table.names.get(&internal) {
                let dotted = new_name.replace('/', ".");
                debug!("manifest {} {} -> {}", MAIN_CLASS, main, dotted);
                bundle.manifest.set(MAIN_CLASS, dotted);
            }
        }

        bundle.program = renamed;
        Ok(true)
    }
}

/// Instance methods of unmoved types overriding a method of a moved ancestor.
/// They follow the ancestor to public.
fn overrides_of_moved(
    program: &Program,
    moved: &HashSet<&str>,
) -> HashMap<String, HashSet<(String, String)>> {
    let mut out: HashMap<String, HashSet<(String, String)>> = HashMap::new();
    for ty in program.types().filter(|t| !moved.contains(t.name.as_str())) {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ancestor = ty.super_name.as_deref().and_then(|s| program.get(s));
        while let Some(a) = ancestor {
            if !seen.insert(a.name.as_str()) {
                break;
            }
            if moved.contains(a.name.as_str()) {
                for m in ty.methods.iter().filter(|m| {
                    !m.access.is_private() && !m.access.is_static() && m.name != "<init>"
                }) {
                    if a.find_method(&m.name, &m.desc).is_some_and(|d| !d.access.is_private()) {
                        out.entry(ty.name.clone())
                            .or_default()
                            .insert((m.name.clone(), m.desc.clone()));
                    }
                }
            }
            ancestor = a.super_name.as_deref().and_then(|s| program.get(s));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use classcloak_core::insn::{Instruction, TypeOp};
    use classcloak_core::keep::KeepRules;
    use classcloak_core::program::{FieldDef, MethodDef};
    use classcloak_core::{AccessFlags, TypeDef};
    use rand::SeedableRng;

    fn bundle() -> ProgramBundle {
        let mut main = TypeDef::new("app/Main");
        main.source_file = Some("Main.java".into());
        main.methods.push(MethodDef {
            name: "make".into(),
            desc: "()Lapp/Helper;".into(),
            access: AccessFlags::PUBLIC | AccessFlags::STATIC,
            max_locals: 0,
            max_stack: 2,
            instructions: vec![Instruction::type_op(TypeOp::New, "app/Helper")],
            exception_regions: Vec::new(),
        });
        let mut helper = TypeDef::new("app/Helper");
        helper.access = AccessFlags::SUPER;
        let program: Program = [main, helper, TypeDef::new("api/Entry")].into_iter().collect();
        let mut bundle = ProgramBundle::new(program, Default::default());
        bundle.manifest.set("Main-Class", "app.Main");
        bundle
    }

    #[test]
    fn renames_unkept_types_and_references() {
        let mut bundle = bundle();
        let pass = ClassRename::new(PassConfig {
            keep: KeepRules::parse_list("api.Entry"),
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(42);
        assert!(pass.apply(&mut bundle, &mut rng).unwrap());

        let program = &bundle.program;
        assert!(program.contains("api/Entry"), "kept type must retain its name");
        assert!(!program.contains("app/Main"));
        let main = program.get("a").expect("first generated name");
        assert_eq!(main.source_file.as_deref(), Some("a.java"));
        assert_eq!(main.methods[0].desc, "()Lb;");
        assert_eq!(
            main.methods[0].instructions[0],
            Instruction::type_op(TypeOp::New, "b")
        );
        let helper = program.get("b").expect("second generated name");
        assert!(helper.access.contains(AccessFlags::PUBLIC));
        assert_eq!(bundle.manifest.get("Main-Class"), Some("a"));
    }

    fn member(name: &str, access: AccessFlags) -> MethodDef {
        MethodDef {
            name: name.into(),
            desc: "()V".into(),
            access,
            max_locals: 1,
            max_stack: 0,
            instructions: vec![Instruction::op(classcloak_core::insn::Op::Return)],
            exception_regions: Vec::new(),
        }
    }

    #[test]
    fn moved_types_open_their_members() {
        let mut internal = TypeDef::new("pkg/Internal");
        internal.methods.push(member("<init>", AccessFlags::empty()));
        internal.methods.push(member("hook", AccessFlags::PROTECTED));
        internal.methods.push(member("secret", AccessFlags::PRIVATE));
        internal.fields.push(FieldDef {
            name: "count".into(),
            desc: "I".into(),
            access: AccessFlags::empty(),
        });
        let mut sub = TypeDef::new("pkg/Sub");
        sub.super_name = Some("pkg/Internal".into());
        sub.methods.push(member("hook", AccessFlags::PROTECTED));
        sub.methods.push(member("other", AccessFlags::PROTECTED));
        let program: Program = [internal, sub, TypeDef::new("pkg/Public")].into_iter().collect();

        let mut bundle = ProgramBundle::new(program, Default::default());
        let pass = ClassRename::new(PassConfig {
            keep: KeepRules::parse_list("pkg.Public,pkg.Sub"),
            ..Default::default()
        });
        pass.apply(&mut bundle, &mut StdRng::seed_from_u64(3)).unwrap();

        let moved = bundle.program.get("a").unwrap();
        assert!(moved.methods[0].access.contains(AccessFlags::PUBLIC), "constructor");
        assert_eq!(moved.methods[1].access, AccessFlags::PUBLIC);
        assert_eq!(moved.methods[2].access, AccessFlags::PRIVATE);
        assert_eq!(moved.fields[0].access, AccessFlags::PUBLIC);

        let sub = bundle.program.get("pkg/Sub").unwrap();
        assert_eq!(sub.super_name.as_deref(), Some("a"));
        assert_eq!(sub.methods[0].access, AccessFlags::PUBLIC, "override follows its parent");
        assert_eq!(sub.methods[1].access, AccessFlags::PROTECTED);
    }

    #[test]
    fn generated_names_avoid_kept_names() {
        let program: Program = [TypeDef::new("a"), TypeDef::new("x/Y")].into_iter().collect();
        let mut bundle = ProgramBundle::new(program, Default::default());
        let pass = ClassRename::new(PassConfig {
            keep: KeepRules::parse_list("a"),
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(1);
        pass.apply(&mut bundle, &mut rng).unwrap();
        let names: Vec<&str> = bundle.program.names().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
