//! Side-effect-free pushes lifted from the original body and replayed as noise
//! in generated cases, each immediately popped again.

use classcloak_core::descriptor::MethodDescriptor;
use classcloak_core::insn::{Constant, Instruction, LabelAllocator, Op, clone_fragment};
use classcloak_core::program::MethodDef;
use classcloak_utils::errors::DescriptorError;
use std::collections::HashSet;

/// Upper bound on collected snippets per method.
pub const POOL_LIMIT: usize = 48;

/// One push and the number of stack slots it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    insn: Instruction,
    wide: bool,
}

impl Snippet {
    /// The push (freshly cloned) followed by the matching pop.
    pub fn emit(&self, labels: &mut LabelAllocator) -> Vec<Instruction> {
        let mut out = clone_fragment(std::slice::from_ref(&self.insn), labels);
        out.push(Instruction::op(if self.wide { Op::Pop2 } else { Op::Pop }));
        out
    }
}

/// Receiver and parameter slots the body never writes.
pub fn stable_slots(method: &MethodDef) -> Result<HashSet<u16>, DescriptorError> {
    let desc = MethodDescriptor::parse(&method.desc)?;
    let mut params: Vec<(u16, u16)> = Vec::new();
    let mut slot = 0u16;
    if !method.access.is_static() {
        params.push((0, 1));
        slot = 1;
    }
    for p in &desc.params {
        params.push((slot, p.slot_size()));
        slot += p.slot_size();
    }

    let mut written = HashSet::new();
    for insn in &method.instructions {
        match insn {
            Instruction::Var { op, slot } if op.is_store() => {
                written.insert(*slot);
                if op.is_wide() {
                    written.insert(slot + 1);
                }
            }
            Instruction::Iinc { slot, .. } => {
                written.insert(*slot);
            }
            _ => {}
        }
    }

    Ok(params
        .into_iter()
        .filter(|&(start, size)| (start..start + size).all(|s| !written.contains(&s)))
        .map(|(start, _)| start)
        .collect())
}

/// Collects up to [`POOL_LIMIT`] pushes whose replay cannot be observed.
pub fn collect_pool(method: &MethodDef, stable: &HashSet<u16>) -> Vec<Snippet> {
    method
        .instructions
        .iter()
        .filter_map(|insn| {
            let wide = match insn {
                Instruction::Var { op, slot } if !op.is_store() && stable.contains(slot) => {
                    op.is_wide()
                }
                Instruction::Const(
                    c @ (Constant::Int(_)
                    | Constant::Long(_)
                    | Constant::Float(_)
                    | Constant::Double(_)
                    | Constant::String(_)),
                ) => c.is_wide(),
                Instruction::Simple(Op::AconstNull) => false,
                _ => return None,
            };
            Some(Snippet {
                insn: insn.clone(),
                wide,
            })
        })
        .take(POOL_LIMIT)
        .collect()
}
