/// Module for override-safe method renaming.
///
/// Methods that must share a name at runtime (an override and the declaration
/// it overrides, or an interface method and the inherited class method that
/// implements it) are joined into one group with a union-find. A group is
/// immutable when any member is reserved, kept, or overrides a declaration that
/// lives outside the program; every other group gets one generated name.
///
/// Generated names are drawn per descriptor, so overloads can never collide, and
/// skip names already used by immutable methods with the same descriptor.
use crate::names::NameGenerator;
use crate::{PassConfig, Transform};
use classcloak_core::hierarchy::{PlatformTypes, TypeInfoSource};
use classcloak_core::insn::{Constant, Instruction};
use classcloak_core::remap::{Remapper, remap_program};
use classcloak_core::{AccessFlags, Program, ProgramBundle, TypeDef};
use classcloak_utils::errors::TransformError;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Names that are never renamed, whatever their visibility.
const RESERVED: [&str; 3] = ["<init>", "<clinit>", "main"];

/// Members of the universal root type and enum helpers. Only private methods
/// with these names may be renamed.
const COMMON_MEMBERS: [&str; 11] = [
    "toString",
    "hashCode",
    "equals",
    "clone",
    "finalize",
    "getClass",
    "notify",
    "notifyAll",
    "wait",
    "values",
    "valueOf",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodId {
    owner: String,
    name: String,
    desc: String,
}

impl MethodId {
    fn new(owner: &str, name: &str, desc: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        }
    }
}

/// Where an override walk ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OverrideRoot {
    /// A declaration inside the program.
    Internal(MethodId),
    /// A declaration outside the program, or a type nothing describes.
    External,
}

/// Disjoint sets of methods with an "immutable" bit per set.
#[derive(Debug, Default)]
struct Groups {
    index: IndexMap<MethodId, usize>,
    parent: Vec<usize>,
    immutable: Vec<bool>,
}

impl Groups {
    fn add(&mut self, id: MethodId) {
        if self.index.contains_key(&id) {
            return;
        }
        let next = self.parent.len();
        self.index.insert(id, next);
        self.parent.push(next);
        self.immutable.push(false);
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn root_of(&mut self, id: &MethodId) -> Option<usize> {
        let i = *self.index.get(id)?;
        Some(self.find(i))
    }

    fn union(&mut self, a: &MethodId, b: &MethodId) {
        let (Some(ra), Some(rb)) = (self.root_of(a), self.root_of(b)) else {
            return;
        };
        if ra != rb {
            self.parent[rb] = ra;
            self.immutable[ra] |= self.immutable[rb];
        }
    }

    fn poison(&mut self, id: &MethodId) {
        if let Some(r) = self.root_of(id) {
            self.immutable[r] = true;
        }
    }

    fn is_immutable(&mut self, id: &MethodId) -> bool {
        self.root_of(id).is_none_or(|r| self.immutable[r])
    }
}

/// Renames methods group by group, preserving dispatch.
pub struct MethodRename {
    config: PassConfig,
}

impl MethodRename {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }

    fn fixed_by_name(&self, ty: &TypeDef, name: &str, access: AccessFlags) -> bool {
        RESERVED.contains(&name)
            || (COMMON_MEMBERS.contains(&name) && !access.is_private())
            || self.config.keep.keeps_member(&ty.name, name)
    }
}

fn overridable(access: AccessFlags) -> bool {
    !access.is_private() && !access.is_static()
}

fn parents(edges_super: Option<&String>, interfaces: &[String]) -> Vec<String> {
    edges_super.into_iter().chain(interfaces).cloned().collect()
}

/// Walks up from `ty` looking for the declarations `name + desc` overrides.
/// Every in-program declaration found is returned; an external declaration (or
/// an ancestor nothing can describe) yields [`OverrideRoot::External`].
fn override_roots(program: &Program, ty: &TypeDef, name: &str, desc: &str) -> Vec<OverrideRoot> {
    let platform = PlatformTypes;
    let mut roots = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier: VecDeque<String> = parents(ty.super_name.as_ref(), &ty.interfaces).into();

    while let Some(current) = frontier.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(parent) = program.get(&current) {
            match parent.find_method(name, desc) {
                Some(m) if overridable(m.access) => {
                    roots.push(OverrideRoot::Internal(MethodId::new(&parent.name, name, desc)));
                }
                _ => frontier.extend(parents(parent.super_name.as_ref(), &parent.interfaces)),
            }
            continue;
        }
        match (platform.declares_method(&current, name, desc), platform.edges(&current)) {
            (Some(false), Some(edges)) => {
                frontier.extend(parents(edges.super_name.as_ref(), &edges.interfaces));
            }
            _ => roots.push(OverrideRoot::External),
        }
    }
    roots
}

/// Every interface reachable from `ty`, in program and platform alike.
fn reachable_interfaces(program: &Program, ty: &TypeDef) -> Vec<String> {
    let platform = PlatformTypes;
    let mut seen: HashSet<String> = HashSet::new();
    let mut found = Vec::new();
    let mut frontier: VecDeque<String> = parents(ty.super_name.as_ref(), &ty.interfaces).into();
    while let Some(current) = frontier.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let edges = program.edges(&current).or_else(|| platform.edges(&current));
        match edges {
            Some(e) => {
                if e.is_interface {
                    found.push(current);
                }
                frontier.extend(parents(e.super_name.as_ref(), &e.interfaces));
            }
            None => {
                // unknown: may well be an interface
                found.push(current);
            }
        }
    }
    found
}

struct MethodTable<'p> {
    program: &'p Program,
    names: HashMap<MethodId, String>,
}

impl Remapper for MethodTable<'_> {
    fn map_method_name(&self, owner: &str, name: &str, desc: &str) -> Option<String> {
        // the first declaration on the resolution path decides, pinned or not
        let mut seen: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> = VecDeque::from([owner]);
        while let Some(current) = frontier.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            let Some(ty) = self.program.get(current) else {
                continue;
            };
            if let Some(m) = ty.find_method(name, desc) {
                if current == owner || !m.access.is_private() {
                    return self.names.get(&MethodId::new(current, name, desc)).cloned();
                }
            }
            frontier.extend(ty.super_name.as_deref());
            frontier.extend(ty.interfaces.iter().map(String::as_str));
        }
        None
    }
}

impl Transform for MethodRename {
    fn name(&self) -> &'static str {
        "MethodRename"
    }

    fn apply(&self, bundle: &mut ProgramBundle, _rng: &mut StdRng) -> Result<bool, TransformError> {
        let program = &bundle.program;
        let platform = PlatformTypes;
        let mut groups = Groups::default();

        let types: Vec<&TypeDef> = program.types().filter(|t| !t.is_module_descriptor()).collect();
        for ty in &types {
            for m in &ty.methods {
                groups.add(MethodId::new(&ty.name, &m.name, &m.desc));
            }
        }

        // overrides and fixed names
        for ty in &types {
            for m in &ty.methods {
                let id = MethodId::new(&ty.name, &m.name, &m.desc);
                if self.fixed_by_name(ty, &m.name, m.access) {
                    groups.poison(&id);
                }
                if !overridable(m.access) {
                    continue;
                }
                for root in override_roots(program, ty, &m.name, &m.desc) {
                    match root {
                        OverrideRoot::Internal(parent) => groups.union(&parent, &id),
                        OverrideRoot::External => {
                            debug!("{}.{}{} overrides an external method", ty.name, m.name, m.desc);
                            groups.poison(&id);
                        }
                    }
                }
            }
        }

        // inherited class methods implementing interfaces of a subclass
        for ty in types.iter().filter(|t| !t.is_interface()) {
            let interfaces = reachable_interfaces(program, ty);
            if interfaces.is_empty() {
                continue;
            }
            let mut implemented: HashSet<(&str, &str)> = HashSet::new();
            let mut class = Some(*ty);
            let mut chain_seen: HashSet<&str> = HashSet::new();
            while let Some(c) = class {
                if !chain_seen.insert(c.name.as_str()) {
                    break;
                }
                for m in c.methods.iter().filter(|m| overridable(m.access)) {
                    if !implemented.insert((m.name.as_str(), m.desc.as_str())) {
                        continue;
                    }
                    let id = MethodId::new(&c.name, &m.name, &m.desc);
                    for iface in &interfaces {
                        match program.get(iface) {
                            Some(decl) => {
                                let declared = decl
                                    .find_method(&m.name, &m.desc)
                                    .is_some_and(|d| !d.access.is_static());
                                if declared {
                                    groups.union(&MethodId::new(iface, &m.name, &m.desc), &id);
                                }
                            }
                            None => {
                                if platform.declares_method(iface, &m.name, &m.desc) != Some(false) {
                                    groups.poison(&id);
                                }
                            }
                        }
                    }
                }
                class = c.super_name.as_deref().and_then(|s| program.get(s));
            }
        }

        // lambda targets are bound by name at the call site
        let call_sites = types
            .iter()
            .flat_map(|t| t.methods.iter())
            .flat_map(|m| m.instructions.iter());
        for insn in call_sites {
            if let Instruction::InvokeDynamic {
                name, desc, args, ..
            } = insn
            {
                let iface = desc
                    .rsplit(')')
                    .next()
                    .and_then(|r| r.strip_prefix('L'))
                    .and_then(|r| r.strip_suffix(';'));
                if let (Some(iface), Some(Constant::MethodType(sam))) = (iface, args.first()) {
                    groups.poison(&MethodId::new(iface, name, sam));
                }
            }
        }

        // naming
        let mut taken: HashMap<&str, HashSet<String>> = HashMap::new();
        let ids: Vec<MethodId> = groups.index.keys().cloned().collect();
        for id in &ids {
            if groups.is_immutable(id) {
                taken.entry(id.desc.as_str()).or_default().insert(id.name.clone());
            }
        }
        let mut generators: HashMap<&str, NameGenerator> = HashMap::new();
        let mut group_names: HashMap<usize, String> = HashMap::new();
        let mut names: HashMap<MethodId, String> = HashMap::new();
        for id in &ids {
            if groups.is_immutable(id) {
                continue;
            }
            let Some(root) = groups.root_of(id) else {
                continue;
            };
            let new_name = group_names
                .entry(root)
                .or_insert_with(|| {
                    let avoid = taken.get(id.desc.as_str());
                    generators
                        .entry(id.desc.as_str())
                        .or_default()
                        .next_avoiding(|n| avoid.is_some_and(|set| set.contains(n)))
                })
                .clone();
            debug!("method {}.{}{} -> {}", id.owner, id.name, id.desc, new_name);
            names.insert(id.clone(), new_name);
        }
        if names.is_empty() {
            return Ok(false);
        }

        let renamed_ids: HashSet<MethodId> = names
            .iter()
            .map(|(id, n)| MethodId::new(&id.owner, n, &id.desc))
            .collect();
        let table = MethodTable { program, names };
        let mut renamed = remap_program(program, &table);
        for ty in renamed.types_mut() {
            for m in &mut ty.methods {
                if renamed_ids.contains(&MethodId::new(&ty.name, &m.name, &m.desc)) {
                    m.access = m.access.widened_to_public();
                }
            }
        }
        bundle.program = renamed;
        Ok(true)
    }
}
