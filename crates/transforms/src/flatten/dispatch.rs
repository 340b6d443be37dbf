//! Generator for the flattened dispatcher.
//!
//! The body becomes a loop around one lookup switch on a `state` slot. Three
//! stage cases each provoke a runtime exception inside a protected region; the
//! handlers carry the state forward, occasionally detouring through junk cases.
//! After the last stage a bridge case selects the real case, which holds the
//! untouched original body. A decreasing `budget` slot forces an exit to the
//! real case should the loop run long, and a gate case may interpose itself
//! between any two dispatches.
//!
//! Every constant is drawn from the injected generator; `mix` and `sink` carry
//! values that never influence which case runs next.

use super::faults::{FaultKind, small_nonzero};
use super::snippets::Snippet;
use classcloak_core::descriptor::ReturnKind;
use classcloak_core::insn::{Constant, Instruction, JumpCond, Label, LabelAllocator, Op, VarOp};
use classcloak_core::program::ExceptionRegion;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashSet;

pub const STAGE_COUNT: usize = 3;
const MIN_JUNK_CASES: usize = 2;
const MAX_JUNK_CASES: usize = 3;
const MIN_BUDGET: i32 = 8;
const MAX_BUDGET: i32 = 14;

/// The five locals the dispatcher adds after the method's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slots {
    pub state: u16,
    pub mix: u16,
    pub sink: u16,
    pub budget: u16,
    pub resume: u16,
}

impl Slots {
    pub const COUNT: u16 = 5;

    /// Slots starting at `max_locals`; `None` if they would not fit.
    pub fn after(max_locals: u16) -> Option<Self> {
        max_locals.checked_add(Self::COUNT)?;
        Some(Self {
            state: max_locals,
            mix: max_locals + 1,
            sink: max_locals + 2,
            budget: max_locals + 3,
            resume: max_locals + 4,
        })
    }
}

/// Output of the generator: the new body and the regions it protects.
#[derive(Debug, Clone)]
pub struct Flattened {
    pub instructions: Vec<Instruction>,
    pub regions: Vec<ExceptionRegion>,
}

/// Keys of the fixed cases.
#[derive(Debug, Clone, Copy)]
struct Keys {
    stages: [i32; STAGE_COUNT],
    bridge: i32,
    exit: i32,
    real: i32,
    gate: i32,
}

#[derive(Debug, Clone, Copy)]
struct CaseLabels {
    stages: [Label; STAGE_COUNT],
    bridge: Label,
    exit: Label,
    real: Label,
    gate: Label,
}

pub struct Dispatcher<'a> {
    rng: &'a mut StdRng,
    slots: Slots,
    snippets: &'a [Snippet],
    labels: LabelAllocator,
    out: Vec<Instruction>,
    used_keys: HashSet<i32>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        rng: &'a mut StdRng,
        slots: Slots,
        snippets: &'a [Snippet],
        labels: LabelAllocator,
    ) -> Self {
        Self {
            rng,
            slots,
            snippets,
            labels,
            out: Vec::new(),
            used_keys: HashSet::new(),
        }
    }

    /// Builds the dispatcher around `original`.
    pub fn build(mut self, original: Vec<Instruction>, ret: ReturnKind) -> Flattened {
        let keys = Keys {
            stages: [self.key(), self.key(), self.key()],
            bridge: self.key(),
            exit: self.key(),
            real: self.key(),
            gate: self.key(),
        };
        let resume_mask: i32 = self.rng.random();
        let gate_mask: i32 = (1 << (2 + self.rng.random_range(0..3u32))) - 1;

        let junk_count = self.rng.random_range(MIN_JUNK_CASES..=MAX_JUNK_CASES);
        let junk: Vec<(i32, Label)> = (0..junk_count)
            .map(|_| (self.key(), self.labels.fresh()))
            .collect();

        let loop_head = self.labels.fresh();
        let default = self.labels.fresh();
        let cases = CaseLabels {
            stages: [self.labels.fresh(), self.labels.fresh(), self.labels.fresh()],
            bridge: self.labels.fresh(),
            exit: self.labels.fresh(),
            real: self.labels.fresh(),
            gate: self.labels.fresh(),
        };

        let faults = FaultKind::pick(self.rng, STAGE_COUNT);
        let mut regions = Vec::with_capacity(STAGE_COUNT);
        let mut protected = Vec::with_capacity(STAGE_COUNT);
        for fault in &faults {
            let (start, end, handler) = (self.labels.fresh(), self.labels.fresh(), self.labels.fresh());
            regions.push(ExceptionRegion {
                start,
                end,
                handler,
                catch_type: Some(fault.catch_type().to_string()),
            });
            protected.push((start, end, handler));
        }

        let mut table: Vec<(i32, Label)> = vec![
            (keys.stages[0], cases.stages[0]),
            (keys.stages[1], cases.stages[1]),
            (keys.stages[2], cases.stages[2]),
            (keys.bridge, cases.bridge),
            (keys.exit, cases.exit),
            (keys.real, cases.real),
            (keys.gate, cases.gate),
        ];
        table.extend(junk.iter().copied());
        table.sort_by_key(|&(k, _)| k);

        self.prologue(keys.stages[0], resume_mask, loop_head);
        self.dispatch_head(loop_head, keys, resume_mask, gate_mask);
        self.out.push(Instruction::LookupSwitch {
            default,
            pairs: table,
        });

        let successors = [keys.stages[1], keys.stages[2], keys.bridge];
        for i in 0..STAGE_COUNT {
            let (start, end, _) = protected[i];
            self.place(cases.stages[i]);
            self.payload(true);
            self.place(start);
            let fault = faults[i].emit(self.rng);
            self.out.extend(fault);
            self.place(end);
            self.transition(keys.stages[i], successors[i]);
            self.goto(loop_head);
        }

        let placement = self.rng.random_range(0..3);
        let mut original = Some(original);
        if placement == 0 {
            self.real_case(cases.real, original.take());
        }

        for i in 0..STAGE_COUNT {
            let (_, _, handler) = protected[i];
            let alternate = junk.get(i).map(|&(k, _)| k);
            self.handler(handler, keys.stages[i], successors[i], alternate, loop_head);
        }

        if placement == 1 {
            self.real_case(cases.real, original.take());
        }

        for (i, &(key, label)) in junk.iter().enumerate() {
            let target_a = if i % 2 == 0 { keys.stages[1] } else { keys.stages[2] };
            let target_b = junk.get(i + 1).map_or(keys.bridge, |&(k, _)| k);
            self.junk_case(label, key, target_a, target_b, ret, loop_head);
        }

        // gate
        self.place(cases.gate);
        self.payload(true);
        self.iload(self.slots.resume);
        self.int(resume_mask);
        self.op(Op::IXor);
        self.istore(self.slots.state);
        self.goto(loop_head);

        // bridge
        self.place(cases.bridge);
        self.payload(true);
        self.transition(keys.bridge, keys.real);
        self.goto(loop_head);

        // exit pivot
        self.place(cases.exit);
        self.payload(true);
        let budget = self.rng.random_range(MIN_BUDGET..=MAX_BUDGET);
        self.int(budget);
        self.istore(self.slots.budget);
        self.transition(keys.exit, keys.real);
        self.goto(loop_head);

        if placement == 2 {
            self.real_case(cases.real, original.take());
        }

        self.place(default);
        self.payload(true);
        self.int(keys.stages[0]);
        self.istore(self.slots.state);
        self.goto(loop_head);

        Flattened {
            instructions: self.out,
            regions,
        }
    }

    fn key(&mut self) -> i32 {
        loop {
            let k: i32 = self.rng.random();
            if self.used_keys.insert(k) {
                return k;
            }
        }
    }

    fn prologue(&mut self, first: i32, resume_mask: i32, loop_head: Label) {
        let s = self.slots;
        self.int(first);
        self.istore(s.state);
        self.out
            .push(Instruction::invoke_static("java/lang/System", "nanoTime", "()J"));
        self.op(Op::L2I);
        self.istore(s.mix);
        let sink = self.rng.random();
        self.int(sink);
        self.istore(s.sink);
        self.int(first ^ resume_mask);
        self.istore(s.resume);

        // budget = (((mix ^ r) + sink) & MAX) % span + MIN
        self.iload(s.mix);
        let r = self.rng.random();
        self.int(r);
        self.op(Op::IXor);
        self.iload(s.sink);
        self.op(Op::IAdd);
        self.int(i32::MAX);
        self.op(Op::IAnd);
        self.int(MAX_BUDGET - MIN_BUDGET + 1);
        self.op(Op::IRem);
        self.int(MIN_BUDGET);
        self.op(Op::IAdd);
        self.istore(s.budget);
        self.goto(loop_head);
    }

    fn dispatch_head(&mut self, loop_head: Label, keys: Keys, resume_mask: i32, gate_mask: i32) {
        let s = self.slots;
        let ready = self.labels.fresh();
        let direct = self.labels.fresh();

        self.place(loop_head);
        self.iload(s.budget);
        self.iload(s.mix);
        self.iload(s.sink);
        self.op(Op::IXor);
        self.int(3);
        self.op(Op::IAnd);
        self.int(1);
        self.op(Op::IAdd);
        self.op(Op::ISub);
        self.istore(s.budget);
        self.iload(s.budget);
        self.jump(JumpCond::IfGe, ready);

        // forced exit, encoded so the key never appears alone
        let a: i32 = self.rng.random();
        let b: i32 = self.rng.random();
        self.iload(s.mix);
        self.int(a);
        self.op(Op::IXor);
        self.iload(s.mix);
        self.op(Op::IXor);
        self.int(b);
        self.op(Op::IXor);
        self.int(keys.exit ^ a ^ b);
        self.op(Op::IXor);
        self.istore(s.state);
        self.int(MAX_BUDGET);
        self.iload(s.mix);
        self.int(3);
        self.op(Op::IAnd);
        self.op(Op::IAdd);
        self.istore(s.budget);

        // the gate never intercepts the exit pivot or the real case
        self.place(ready);
        for key in [keys.exit, keys.real] {
            let veil: i32 = self.rng.random();
            self.iload(s.state);
            self.int(veil);
            self.op(Op::IXor);
            self.int(key ^ veil);
            self.jump(JumpCond::IfICmpEq, direct);
        }
        self.iload(s.budget);
        self.int(1);
        self.jump(JumpCond::IfICmpLe, direct);
        self.iload(s.mix);
        self.iload(s.sink);
        self.op(Op::IXor);
        self.iload(s.budget);
        self.op(Op::IXor);
        self.int(gate_mask);
        self.op(Op::IAnd);
        self.jump(JumpCond::IfNe, direct);
        self.iload(s.state);
        self.int(resume_mask);
        self.op(Op::IXor);
        self.istore(s.resume);
        self.int(keys.gate);
        self.istore(s.state);

        self.place(direct);
        self.iload(s.state);
    }

    fn handler(
        &mut self,
        handler: Label,
        from: i32,
        target: i32,
        alternate: Option<i32>,
        loop_head: Label,
    ) {
        self.place(handler);
        self.op(Op::Pop);
        self.payload(true);
        if let Some(alternate) = alternate {
            let primary = self.labels.fresh();
            self.iload(self.slots.mix);
            self.iload(self.slots.sink);
            self.op(Op::IXor);
            let mask = self.rng.random_range(1..=7);
            self.int(mask);
            self.op(Op::IAnd);
            self.jump(JumpCond::IfNe, primary);
            self.transition(from, alternate);
            self.goto(loop_head);
            self.place(primary);
        }
        self.transition(from, target);
        self.goto(loop_head);
    }

    fn junk_case(
        &mut self,
        label: Label,
        from: i32,
        target_a: i32,
        target_b: i32,
        ret: ReturnKind,
        loop_head: Label,
    ) {
        self.place(label);
        self.payload(true);
        self.fake_return(ret);

        let branch_b = self.labels.fresh();
        self.iload(self.slots.mix);
        self.iload(self.slots.sink);
        self.op(Op::IAdd);
        let mask = self.rng.random_range(1..=5);
        self.int(mask);
        self.op(Op::IAnd);
        self.jump(JumpCond::IfNe, branch_b);
        self.transition(from, target_a);
        self.goto(loop_head);

        self.place(branch_b);
        self.transition(from, target_b);
        self.goto(loop_head);
    }

    /// `(budget ^ mix ^ mix) & sink` against `budget & sink`: always equal, so the
    /// return below is dead.
    fn fake_return(&mut self, ret: ReturnKind) {
        let s = self.slots;
        let fake = self.labels.fresh();
        let done = self.labels.fresh();
        self.iload(s.budget);
        self.iload(s.mix);
        self.op(Op::IXor);
        self.iload(s.mix);
        self.op(Op::IXor);
        self.iload(s.sink);
        self.op(Op::IAnd);
        self.iload(s.budget);
        self.iload(s.sink);
        self.op(Op::IAnd);
        self.jump(JumpCond::IfICmpNe, fake);
        self.goto(done);

        self.place(fake);
        match ret {
            ReturnKind::Void => self.op(Op::Return),
            ReturnKind::Int => {
                self.int(0);
                self.op(Op::IReturn);
            }
            ReturnKind::Float => {
                self.out.push(Instruction::Const(Constant::Float(0.0)));
                self.op(Op::FReturn);
            }
            ReturnKind::Long => {
                self.out.push(Instruction::Const(Constant::Long(0)));
                self.op(Op::LReturn);
            }
            ReturnKind::Double => {
                self.out.push(Instruction::Const(Constant::Double(0.0)));
                self.op(Op::DReturn);
            }
            ReturnKind::Reference => {
                self.op(Op::AconstNull);
                self.op(Op::AReturn);
            }
        }
        self.place(done);
    }

    /// The original body, followed by a guard that is never reached.
    fn real_case(&mut self, label: Label, original: Option<Vec<Instruction>>) {
        self.place(label);
        self.payload(false);
        self.out.extend(original.unwrap_or_default());
        self.op(Op::AconstNull);
        self.op(Op::AThrow);
    }

    /// Evolves `mix` and `sink`, optionally splicing in snippet noise first.
    fn payload(&mut self, with_snippets: bool) {
        if with_snippets && !self.snippets.is_empty() {
            let count = 1 + self.rng.random_range(0..self.snippets.len().min(2));
            for _ in 0..count {
                let pick = self.rng.random_range(0..self.snippets.len());
                let cloned = self.snippets[pick].emit(&mut self.labels);
                self.out.extend(cloned);
            }
        }

        let s = self.slots;
        match self.rng.random_range(0..4) {
            0 => {
                self.iload(s.mix);
                let r = self.rng.random();
                self.int(r);
                self.op(Op::IXor);
                self.istore(s.mix);
                self.iload(s.sink);
                self.iload(s.mix);
                self.op(Op::IAdd);
                self.istore(s.sink);
            }
            1 => {
                self.iload(s.sink);
                let odd = 3 + 2 * self.rng.random_range(0..4);
                self.int(odd);
                self.op(Op::IMul);
                self.iload(s.mix);
                self.op(Op::IXor);
                self.istore(s.sink);
                let delta = small_nonzero(self.rng);
                self.out.push(Instruction::Iinc {
                    slot: s.mix,
                    delta: delta as i16,
                });
            }
            2 => {
                self.iload(s.mix);
                self.iload(s.sink);
                self.op(Op::IAdd);
                let r = self.rng.random();
                self.int(r);
                self.op(Op::IXor);
                self.istore(s.mix);
                self.iload(s.sink);
                let r = self.rng.random();
                self.int(r);
                self.op(Op::IAdd);
                self.iload(s.mix);
                self.op(Op::IXor);
                self.istore(s.sink);
            }
            _ => {
                self.iload(s.mix);
                let shift = self.rng.random_range(1..=30);
                self.int(shift);
                self.rotate_left();
                self.istore(s.mix);
                self.iload(s.sink);
                self.iload(s.mix);
                self.op(Op::IXor);
                self.istore(s.sink);
            }
        }
    }

    /// Moves `state` from `from` to `to` with one of five encodings.
    fn transition(&mut self, from: i32, to: i32) {
        let state = self.slots.state;
        match self.rng.random_range(0..5) {
            0 => {
                self.int(to);
                self.istore(state);
            }
            1 => {
                self.iload(state);
                self.int(to.wrapping_sub(from));
                self.op(Op::IAdd);
                self.istore(state);
            }
            2 => {
                self.iload(state);
                self.int(from ^ to);
                self.op(Op::IXor);
                self.istore(state);
            }
            3 => {
                let mul = 3 + 2 * self.rng.random_range(0..4);
                self.iload(state);
                self.int(mul);
                self.op(Op::IMul);
                self.int(to.wrapping_sub(from.wrapping_mul(mul)));
                self.op(Op::IAdd);
                self.istore(state);
            }
            _ => {
                let shift: i32 = self.rng.random_range(1..=30);
                self.iload(state);
                self.int(shift);
                self.rotate_left();
                self.int(from.rotate_left(shift as u32) ^ to);
                self.op(Op::IXor);
                self.istore(state);
            }
        }
    }

    fn rotate_left(&mut self) {
        self.out
            .push(Instruction::invoke_static("java/lang/Integer", "rotateLeft", "(II)I"));
    }

    fn place(&mut self, label: Label) {
        self.out.push(Instruction::Label(label));
    }

    fn goto(&mut self, label: Label) {
        self.out.push(Instruction::goto(label));
    }

    fn jump(&mut self, cond: JumpCond, label: Label) {
        self.out.push(Instruction::jump(cond, label));
    }

    fn op(&mut self, op: Op) {
        self.out.push(Instruction::op(op));
    }

    fn int(&mut self, value: i32) {
        self.out.push(Instruction::push_int(value));
    }

    fn iload(&mut self, slot: u16) {
        self.out.push(Instruction::load(VarOp::ILoad, slot));
    }

    fn istore(&mut self, slot: u16) {
        self.out.push(Instruction::load(VarOp::IStore, slot));
    }
}
