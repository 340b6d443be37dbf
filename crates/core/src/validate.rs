//! Structural checks on method bodies: label placement, jump tables and
//! exception regions.

use crate::hierarchy::CommonAncestorResolver;
use crate::insn::{Instruction, Label};
use crate::program::{MethodDef, Program};
use classcloak_utils::errors::ValidationError;
use std::collections::{HashMap, HashSet};

const THROWABLE: &str = "java/lang/Throwable";

/// Checks that every referenced label is placed exactly once, switch tables are
/// consistent, and every exception region covers a non-empty forward range.
///
/// `context` names the method in error messages.
pub fn validate_method(method: &MethodDef, context: &str) -> Result<(), ValidationError> {
    let mut placed: HashMap<Label, usize> = HashMap::new();
    for (idx, insn) in method.instructions.iter().enumerate() {
        if let Instruction::Label(l) = insn {
            if placed.insert(*l, idx).is_some() {
                return Err(ValidationError::DuplicateLabel {
                    method: context.to_string(),
                    label: l.0,
                });
            }
        }
    }

    let dangling = |l: Label| ValidationError::DanglingLabel {
        method: context.to_string(),
        label: l.0,
    };

    for insn in &method.instructions {
        if let Some(missing) = insn.targets().into_iter().find(|t| !placed.contains_key(t)) {
            return Err(dangling(missing));
        }
        match insn {
            Instruction::LookupSwitch { pairs, .. } => {
                let mut keys = HashSet::new();
                if let Some((key, _)) = pairs.iter().find(|(k, _)| !keys.insert(*k)) {
                    return Err(ValidationError::DuplicateSwitchKey {
                        method: context.to_string(),
                        key: *key,
                    });
                }
            }
            Instruction::TableSwitch {
                low, high, targets, ..
            } => {
                let expected = i64::from(*high) - i64::from(*low) + 1;
                if expected < 0 || targets.len() as i64 != expected {
                    return Err(ValidationError::TableSwitchArity {
                        method: context.to_string(),
                        low: *low,
                        high: *high,
                        found: targets.len(),
                    });
                }
            }
            _ => {}
        }
    }

    for region in &method.exception_regions {
        let lookup = |l: Label| placed.get(&l).copied().ok_or_else(|| dangling(l));
        let start = lookup(region.start)?;
        let end = lookup(region.end)?;
        lookup(region.handler)?;
        if start >= end {
            return Err(ValidationError::InvertedRegion {
                method: context.to_string(),
                start: region.start.0,
                end: region.end.0,
            });
        }
    }
    Ok(())
}

/// Rejects handlers whose catch type is known and not a throwable. Types neither
/// the program nor the fallback describe are accepted.
pub fn validate_handlers(
    method: &MethodDef,
    context: &str,
    resolver: &CommonAncestorResolver<'_>,
) -> Result<(), ValidationError> {
    for catch_type in method
        .exception_regions
        .iter()
        .filter_map(|r| r.catch_type.as_deref())
    {
        if resolver.knows(catch_type) && !resolver.is_assignable(THROWABLE, catch_type) {
            return Err(ValidationError::NonThrowableCatch {
                method: context.to_string(),
                catch_type: catch_type.to_string(),
            });
        }
    }
    Ok(())
}

/// Validates every method body in the program.
pub fn validate_program(program: &Program) -> Result<(), ValidationError> {
    let resolver = CommonAncestorResolver::with_platform(program);
    for ty in program.types() {
        for method in ty.methods.iter().filter(|m| m.has_body()) {
            let context = format!("{}.{}{}", ty.name, method.name, method.desc);
            validate_method(method, &context)?;
            validate_handlers(method, &context, &resolver)?;
        }
    }
    Ok(())
}
