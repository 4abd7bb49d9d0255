//! Reorder Buffer (ROB) for in-order commit of out-of-order execution.
//!
//! The ROB is a circular buffer of `ROB_SIZE` slots tracking every in-flight
//! instruction from dispatch to commit. It provides:
//! 1. **Allocation:** `push` assigns the slot at the push pointer and returns
//!    its index, which doubles as the instruction's rename tag.
//! 2. **Completion:** `write_state` records a common-data-bus broadcast.
//! 3. **In-order commit:** the pop-pointer slot is the only commit candidate.
//! 4. **Operand snapshot:** reservation stations read already-completed
//!    results at dispatch via `read`/`check_ready`.
//! 5. **Flush:** squashes every entry after a misprediction or load-ordering
//!    violation.
//!
//! The live range is the half-open circular interval `[pop_ptr, push_ptr)`;
//! one slot stays unused to distinguish full from empty.

use crate::common::constants::ROB_SIZE;
use crate::isa::Instruction;

/// Per-entry result state, filled in by a CDB broadcast.
#[derive(Clone, Debug, Default)]
pub struct RobStatus {
    /// Computed result (ALU output, load data, link address, or store
    /// effective address).
    pub result: u32,
    /// Branch outcome disagreed with the fetch-time prediction.
    pub mispredict: bool,
    /// Actual branch direction.
    pub actual_taken: bool,
    /// Resolved control-transfer target.
    pub jump_target: u32,
    /// The entry is eligible for commit.
    pub ready: bool,
    /// The memory access hit in the data cache (loads/stores).
    pub cache_hit: bool,
}

/// A completion broadcast on the common data bus, fanned out to every
/// reservation station and written into the ROB.
#[derive(Clone, Copy, Debug, Default)]
pub struct RobWritePort {
    /// Computed result.
    pub result: u32,
    /// Branch outcome disagreed with the prediction.
    pub mispredict: bool,
    /// Actual branch direction.
    pub actual_taken: bool,
    /// Resolved control-transfer target.
    pub jump_target: u32,
    /// Index of the completing entry.
    pub rob_idx: usize,
    /// The memory access hit in the data cache.
    pub cache_hit: bool,
}

/// A single reorder-buffer slot.
#[derive(Clone, Debug)]
pub struct RobEntry {
    /// The in-flight instruction.
    pub inst: Instruction,
    /// Result state.
    pub state: RobStatus,
    /// Whether this slot is occupied.
    pub valid: bool,
}

impl Default for RobEntry {
    fn default() -> Self {
        Self {
            inst: Instruction::nop(),
            state: RobStatus::default(),
            valid: false,
        }
    }
}

/// The reorder buffer.
pub struct ReorderBuffer {
    buffer: [RobEntry; ROB_SIZE],
    push_ptr: usize,
    pop_ptr: usize,
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReorderBuffer {
    /// Creates an empty reorder buffer.
    pub fn new() -> Self {
        Self {
            buffer: std::array::from_fn(|_| RobEntry::default()),
            push_ptr: 0,
            pop_ptr: 0,
        }
    }

    /// True if a slot is available (one slot is reserved to distinguish full
    /// from empty).
    pub fn can_push(&self) -> bool {
        (self.push_ptr + 1) % ROB_SIZE != self.pop_ptr
    }

    /// True if the head entry exists and is ready to commit.
    pub fn can_pop(&self) -> bool {
        let head = &self.buffer[self.pop_ptr];
        head.valid && head.state.ready
    }

    /// Allocates the next slot for `inst` and returns its index.
    ///
    /// Entries pushed with `ready` (the no-functional-unit class) commit
    /// without a CDB broadcast. Panics if the buffer is full.
    pub fn push(&mut self, inst: Instruction, ready: bool) -> usize {
        assert!(self.can_push(), "push into a full ROB");
        let idx = self.push_ptr;
        self.buffer[idx] = RobEntry {
            inst,
            state: RobStatus {
                ready,
                ..RobStatus::default()
            },
            valid: true,
        };
        self.push_ptr = (self.push_ptr + 1) % ROB_SIZE;
        idx
    }

    /// Retires the head entry. Panics if the head is absent or not ready.
    pub fn pop(&mut self) {
        assert!(self.can_pop(), "pop from an empty or non-ready ROB head");
        self.buffer[self.pop_ptr].valid = false;
        self.pop_ptr = (self.pop_ptr + 1) % ROB_SIZE;
    }

    /// Returns the head entry, if one is live.
    pub fn front(&self) -> Option<&RobEntry> {
        let head = &self.buffer[self.pop_ptr];
        head.valid.then_some(head)
    }

    /// Records a completion broadcast and marks the entry ready.
    pub fn write_state(&mut self, w: &RobWritePort) {
        let entry = &mut self.buffer[w.rob_idx];
        assert!(entry.valid, "CDB write to an invalid ROB slot {}", w.rob_idx);
        entry.state = RobStatus {
            result: w.result,
            mispredict: w.mispredict,
            actual_taken: w.actual_taken,
            jump_target: w.jump_target,
            ready: true,
            cache_hit: w.cache_hit,
        };
    }

    /// Reads the result of slot `idx` (operand snapshot at dispatch).
    pub fn read(&self, idx: usize) -> u32 {
        self.buffer[idx].state.result
    }

    /// Returns the ready flag of slot `idx`.
    pub fn check_ready(&self, idx: usize) -> bool {
        self.buffer[idx].state.ready
    }

    /// The current pop pointer, the origin of the program-order
    /// linearization used by the load and store buffers.
    pub fn pop_ptr(&self) -> usize {
        self.pop_ptr
    }

    /// Invalidates every entry and resets both pointers.
    pub fn flush(&mut self) {
        for entry in &mut self.buffer {
            entry.valid = false;
        }
        self.push_ptr = 0;
        self.pop_ptr = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_consecutive_indices() {
        let mut rob = ReorderBuffer::new();
        assert_eq!(rob.push(Instruction::nop(), false), 0);
        assert_eq!(rob.push(Instruction::nop(), false), 1);
        assert!(rob.front().is_some());
        assert!(!rob.can_pop());
    }

    #[test]
    fn holds_rob_size_minus_one_entries() {
        let mut rob = ReorderBuffer::new();
        for _ in 0..ROB_SIZE - 1 {
            assert!(rob.can_push());
            rob.push(Instruction::nop(), false);
        }
        assert!(!rob.can_push());
    }

    #[test]
    fn cdb_write_makes_head_committable() {
        let mut rob = ReorderBuffer::new();
        let idx = rob.push(Instruction::nop(), false);
        assert!(!rob.check_ready(idx));

        rob.write_state(&RobWritePort {
            result: 42,
            rob_idx: idx,
            ..RobWritePort::default()
        });
        assert!(rob.check_ready(idx));
        assert_eq!(rob.read(idx), 42);
        assert!(rob.can_pop());
        rob.pop();
        assert!(rob.front().is_none());
    }

    #[test]
    fn ready_at_push_commits_without_broadcast() {
        let mut rob = ReorderBuffer::new();
        rob.push(Instruction::nop(), true);
        assert!(rob.can_pop());
    }

    #[test]
    fn out_of_order_completion_commits_in_order() {
        let mut rob = ReorderBuffer::new();
        let a = rob.push(Instruction::nop(), false);
        let b = rob.push(Instruction::nop(), false);

        rob.write_state(&RobWritePort {
            result: 200,
            rob_idx: b,
            ..RobWritePort::default()
        });
        assert!(!rob.can_pop());

        rob.write_state(&RobWritePort {
            result: 100,
            rob_idx: a,
            ..RobWritePort::default()
        });
        assert!(rob.can_pop());
        assert_eq!(rob.front().unwrap().state.result, 100);
        rob.pop();
        assert_eq!(rob.front().unwrap().state.result, 200);
    }

    #[test]
    fn pointers_wrap_around() {
        let mut rob = ReorderBuffer::new();
        for i in 0..3 * ROB_SIZE {
            let idx = rob.push(Instruction::nop(), true);
            assert_eq!(idx, i % ROB_SIZE);
            rob.pop();
        }
    }

    #[test]
    fn flush_empties_everything() {
        let mut rob = ReorderBuffer::new();
        for _ in 0..5 {
            rob.push(Instruction::nop(), true);
        }
        rob.flush();
        assert!(rob.front().is_none());
        assert_eq!(rob.pop_ptr(), 0);
        assert_eq!(rob.push(Instruction::nop(), true), 0);
    }

    #[test]
    #[should_panic(expected = "pop from an empty")]
    fn pop_empty_is_a_contract_violation() {
        ReorderBuffer::new().pop();
    }
}
