//! Control-flow flattening.
//!
//! Each eligible method body is wrapped, unchanged, in a randomized dispatcher
//! (see [`dispatch`]) so that a decompiler sees one loop around a lookup switch
//! with exception-driven transitions instead of the original structure.

pub mod dispatch;
pub mod faults;
pub mod snippets;

use crate::{PassConfig, Transform};
use classcloak_core::descriptor::MethodDescriptor;
use classcloak_core::program::MethodDef;
use classcloak_core::validate::validate_method;
use classcloak_core::{AccessFlags, ProgramBundle};
use classcloak_utils::errors::TransformError;
use dispatch::{Dispatcher, Slots};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

/// Stack depth the generated code needs on its own.
const DISPATCH_STACK: u16 = 6;

/// Flattens method bodies into an exception-driven dispatch loop.
pub struct FlowObfuscation {
    config: PassConfig,
}

impl FlowObfuscation {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }

    fn eligible(&self, method: &MethodDef, context: &str) -> bool {
        if !method.has_body() || method.is_constructor() || method.is_static_initializer() {
            return false;
        }
        if method.access.contains(AccessFlags::SYNTHETIC) {
            return false;
        }
        if method.instruction_count() < self.config.min_flatten_insns {
            return false;
        }
        if method.instructions.iter().any(|i| i.is_legacy_subroutine()) {
            debug!("{}: legacy subroutine, skipped", context);
            return false;
        }
        true
    }
}

/// Large bodies are flattened only some of the time.
fn admitted(size: usize, rng: &mut StdRng) -> bool {
    let percent = match size {
        0..=60 => return true,
        61..=140 => 90,
        141..=260 => 72,
        _ => 45,
    };
    rng.random_range(0..100) < percent
}

/// Rewrites one method in place and validates the result.
pub fn flatten_method(
    method: &mut MethodDef,
    rng: &mut StdRng,
    context: &str,
) -> Result<bool, TransformError> {
    let Some(slots) = Slots::after(method.max_locals) else {
        debug!("{}: no room for dispatcher locals", context);
        return Ok(false);
    };
    let ret = MethodDescriptor::parse(&method.desc)?.return_kind();
    let stable = snippets::stable_slots(method)?;
    let pool = snippets::collect_pool(method, &stable);
    let labels = method.label_allocator();

    let original = std::mem::take(&mut method.instructions);
    let flattened = Dispatcher::new(rng, slots, &pool, labels).build(original, ret);

    method.instructions = flattened.instructions;
    method.exception_regions.extend(flattened.regions);
    method.max_locals += Slots::COUNT;
    method.max_stack = method.max_stack.max(DISPATCH_STACK);

    validate_method(method, context)?;
    Ok(true)
}

impl Transform for FlowObfuscation {
    fn name(&self) -> &'static str {
        "FlowObfuscation"
    }

    fn apply(&self, bundle: &mut ProgramBundle, rng: &mut StdRng) -> Result<bool, TransformError> {
        let keep = &self.config.keep;
        let mut flattened = 0usize;

        for ty in bundle.program.types_mut() {
            if keep.keeps_type(&ty.name) || ty.is_interface() || ty.is_module_descriptor() {
                continue;
            }
            let owner = ty.name.clone();
            for method in &mut ty.methods {
                if keep.keeps_member(&owner, &method.name) {
                    continue;
                }
                let context = format!("{}.{}{}", owner, method.name, method.desc);
                if !self.eligible(method, &context) {
                    continue;
                }
                if !admitted(method.instruction_count(), rng) {
                    debug!("{}: not admitted at size {}", context, method.instruction_count());
                    continue;
                }
                if flatten_method(method, rng, &context)? {
                    debug!("{}: flattened", context);
                    flattened += 1;
                }
            }
        }

        debug!("Flattened {} methods", flattened);
        Ok(flattened > 0)
    }
}
