//! Frontend: fetch/decode delay line feeding the backend.
//!
//! Instructions flow through four slots (IF1, IF2, ID, DISPATCH) before
//! reaching the backend, modeling the fetch-to-dispatch latency. The
//! backend treats the frontend as an opaque source: `step` yields at most
//! one instruction per tick, `jump` redirects it, `halt_dispatch` makes it
//! re-deliver the rejected instruction, and `bpu_backend_update` trains the
//! optional branch predictor.

use tracing::trace;

use crate::common::constants::{INST_MEM_BASE, INST_MEM_SIZE};
use crate::core::predictor::BranchPredictor;
use crate::isa::{BranchPredictBundle, Instruction};

/// Commit-time branch outcome handed back to the predictor.
#[derive(Clone, Copy, Debug)]
pub struct BpuUpdateData {
    /// Pc of the committed control-transfer instruction.
    pub pc: u32,
    /// JAL linking into `ra` (a call).
    pub is_call: bool,
    /// JALR returning through `ra`.
    pub is_return: bool,
    /// Conditional branch (neither JAL nor JALR).
    pub is_branch: bool,
    /// Actual direction.
    pub branch_taken: bool,
    /// Resolved target.
    pub jump_target: u32,
}

/// The instruction-supply pipeline.
pub struct Frontend {
    pc: u32,
    inst_mem: Vec<u32>,
    if1: Option<Instruction>,
    if2: Option<Instruction>,
    id: Option<Instruction>,
    dispatch: Option<Instruction>,
    dispatch_halted: bool,
    predictor: Option<BranchPredictor>,
}

impl Frontend {
    /// Creates a frontend over `text`, optionally with a branch predictor.
    /// The pc starts at the instruction-region base until `jump` or `reset`.
    pub fn new(text: &[u32], predictor: Option<BranchPredictor>) -> Self {
        let mut inst_mem = vec![0u32; (INST_MEM_SIZE >> 2) as usize];
        inst_mem[..text.len()].copy_from_slice(text);
        Self {
            pc: INST_MEM_BASE,
            inst_mem,
            if1: None,
            if2: None,
            id: None,
            dispatch: None,
            dispatch_halted: false,
            predictor,
        }
    }

    /// Advances the delay line and yields the instruction at the dispatch
    /// slot, if any.
    ///
    /// While halted (the backend rejected the previous delivery), the same
    /// instruction is re-delivered and the line does not advance.
    pub fn step(&mut self) -> Option<Instruction> {
        if self.dispatch_halted {
            self.dispatch_halted = false;
            return self.dispatch.clone();
        }
        self.dispatch = self.id.take();
        self.id = self.if2.take();
        self.if2 = self.if1.take();
        self.if1 = self.fetch();
        self.dispatch.clone()
    }

    /// Redirects fetch to `target`, discarding everything in flight.
    pub fn jump(&mut self, target: u32) {
        trace!(target, "frontend redirect");
        self.pc = target;
        self.if1 = None;
        self.if2 = None;
        self.id = None;
        self.dispatch = None;
        self.dispatch_halted = false;
    }

    /// Holds the dispatch slot: the next `step` re-delivers the same
    /// instruction.
    pub fn halt_dispatch(&mut self) {
        self.dispatch_halted = true;
    }

    /// Feeds a commit-time branch outcome to the predictor, if one is
    /// attached.
    pub fn bpu_backend_update(&mut self, data: &BpuUpdateData) {
        if let Some(predictor) = &mut self.predictor {
            predictor.update(data);
        }
    }

    /// Reinstalls the instruction image and restarts fetch at `entry`.
    pub fn reset(&mut self, text: &[u32], entry: u32) {
        self.inst_mem.fill(0);
        self.inst_mem[..text.len()].copy_from_slice(text);
        self.jump(entry);
    }

    fn fetch(&mut self) -> Option<Instruction> {
        if !(INST_MEM_BASE..INST_MEM_BASE + INST_MEM_SIZE).contains(&self.pc) {
            return None;
        }
        let raw = self.inst_mem[((self.pc - INST_MEM_BASE) >> 2) as usize];
        let predict = self
            .predictor
            .as_ref()
            .map_or_else(BranchPredictBundle::default, |p| p.predict(self.pc));
        let inst = Instruction::new(raw, self.pc, predict);
        self.pc = if predict.taken {
            predict.target
        } else {
            self.pc.wrapping_add(4)
        };
        Some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_appears_on_the_fourth_step() {
        let mut fe = Frontend::new(&[0x13, 0x13, 0x13, 0x13], None);
        fe.jump(INST_MEM_BASE);
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
        let inst = fe.step().unwrap();
        assert_eq!(inst.pc, INST_MEM_BASE);
        assert_eq!(fe.step().unwrap().pc, INST_MEM_BASE + 4);
    }

    #[test]
    fn halt_re_delivers_the_same_instruction() {
        let mut fe = Frontend::new(&[0x13, 0x13, 0x13, 0x13], None);
        fe.jump(INST_MEM_BASE);
        for _ in 0..3 {
            let _ = fe.step();
        }
        let first = fe.step().unwrap();
        fe.halt_dispatch();
        let again = fe.step().unwrap();
        assert_eq!(first.pc, again.pc);
        // Accepted now; the line resumes from where it stopped.
        assert_eq!(fe.step().unwrap().pc, INST_MEM_BASE + 4);
    }

    #[test]
    fn jump_discards_in_flight_instructions() {
        let mut fe = Frontend::new(&[0x13; 8], None);
        fe.jump(INST_MEM_BASE);
        for _ in 0..4 {
            let _ = fe.step();
        }
        fe.jump(INST_MEM_BASE + 16);
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
        assert_eq!(fe.step().unwrap().pc, INST_MEM_BASE + 16);
    }

    #[test]
    fn predictor_steers_the_fetch_stream() {
        let mut predictor = BranchPredictor::new();
        predictor.update(&BpuUpdateData {
            pc: INST_MEM_BASE,
            is_call: false,
            is_return: false,
            is_branch: false,
            branch_taken: true,
            jump_target: INST_MEM_BASE + 32,
        });
        let mut fe = Frontend::new(&[0x13; 16], Some(predictor));
        fe.jump(INST_MEM_BASE);
        for _ in 0..3 {
            let _ = fe.step();
        }
        let inst = fe.step().unwrap();
        assert!(inst.predict.taken);
        // The next fetched instruction followed the predicted target.
        assert_eq!(fe.step().unwrap().pc, INST_MEM_BASE + 32);
    }

    #[test]
    fn fetch_stops_outside_the_text_region() {
        let mut fe = Frontend::new(&[0x13], None);
        fe.jump(0x7000_0000);
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
        assert!(fe.step().is_none());
    }
}
