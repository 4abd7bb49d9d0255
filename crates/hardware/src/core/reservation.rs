//! Reservation stations: operand capture and wake-up.
//!
//! Each functional unit owns an `N`-slot station. At dispatch a slot
//! captures its operands — from the register file if the source is not
//! renamed, from the ROB if the producer already completed, or as a
//! wait-for-wakeup tag naming the producer's ROB index otherwise. Completion
//! broadcasts on the common data bus fill waiting ports in place.
//!
//! Slots are kept compacted in dispatch order, so slot order *is* program
//! order. Only the load/store station relies on that: its issue rule anchors
//! on the oldest store. Other stations simply issue the oldest ready entry.

use crate::core::regfile::RegisterFile;
use crate::core::rob::{ReorderBuffer, RobWritePort};
use crate::isa::Instruction;

/// One captured source operand.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegReadPort {
    /// Still waiting for the producer's broadcast.
    pub wait_for_wakeup: bool,
    /// ROB index of the awaited producer (meaningful while waiting).
    pub rob_idx: usize,
    /// Captured operand value (meaningful once not waiting).
    pub value: u32,
}

/// A reservation-station slot, also the bundle handed to an execute
/// pipeline at issue.
#[derive(Clone, Debug)]
pub struct IssueSlot {
    /// The instruction occupying the slot.
    pub inst: Instruction,
    /// Its ROB index.
    pub rob_idx: usize,
    /// First source operand (`rs1`).
    pub port1: RegReadPort,
    /// Second source operand (`rs2`).
    pub port2: RegReadPort,
    /// Whether the slot is occupied.
    pub busy: bool,
}

impl Default for IssueSlot {
    fn default() -> Self {
        Self {
            inst: Instruction::nop(),
            rob_idx: 0,
            port1: RegReadPort::default(),
            port2: RegReadPort::default(),
            busy: false,
        }
    }
}

impl IssueSlot {
    /// Both operands captured.
    fn operands_ready(&self) -> bool {
        !self.port1.wait_for_wakeup && !self.port2.wait_for_wakeup
    }
}

/// An `N`-slot reservation station for one functional-unit class.
pub struct ReservationStation<const N: usize> {
    slots: [IssueSlot; N],
    /// Apply the load/store issue-ordering rule.
    mem_ordered: bool,
}

impl<const N: usize> ReservationStation<N> {
    /// Creates a station with unconstrained issue order.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| IssueSlot::default()),
            mem_ordered: false,
        }
    }

    /// Creates the load/store station, whose issue selection anchors on the
    /// oldest store.
    pub fn new_mem_ordered() -> Self {
        Self {
            mem_ordered: true,
            ..Self::new()
        }
    }

    /// True if a slot is free.
    pub fn has_empty_slot(&self) -> bool {
        self.slots.iter().any(|slot| !slot.busy)
    }

    /// Dispatches `inst` into the station, capturing operands.
    ///
    /// For each source register: an unrenamed register reads the register
    /// file; a renamed one whose producer already completed reads the ROB;
    /// otherwise the port waits for the producer's broadcast. The new slot
    /// becomes the youngest entry. Panics if the station is full.
    pub fn insert(
        &mut self,
        inst: Instruction,
        rob_idx: usize,
        regfile: &RegisterFile,
        rob: &ReorderBuffer,
    ) {
        let free = self
            .slots
            .iter()
            .position(|slot| !slot.busy)
            .expect("insert into a full reservation station");
        let port1 = capture_operand(inst.rs1(), regfile, rob);
        let port2 = capture_operand(inst.rs2(), regfile, rob);
        self.slots[free] = IssueSlot {
            inst,
            rob_idx,
            port1,
            port2,
            busy: true,
        };
    }

    /// Fills every port waiting on the broadcasting producer.
    pub fn wakeup(&mut self, w: &RobWritePort) {
        for slot in self.slots.iter_mut().filter(|slot| slot.busy) {
            for port in [&mut slot.port1, &mut slot.port2] {
                if port.wait_for_wakeup && port.rob_idx == w.rob_idx {
                    port.value = w.result;
                    port.wait_for_wakeup = false;
                }
            }
        }
    }

    /// True if `issue` would produce a slot this cycle.
    pub fn can_issue(&self) -> bool {
        self.eligible_index().is_some()
    }

    /// Removes and returns the oldest eligible ready slot, preserving
    /// program order among the remaining entries. Panics if nothing is
    /// eligible.
    pub fn issue(&mut self) -> IssueSlot {
        let idx = self
            .eligible_index()
            .expect("issue from a station with no eligible slot");
        let slot = self.slots[idx].clone();
        for i in idx..N - 1 {
            self.slots[i] = self.slots[i + 1].clone();
        }
        self.slots[N - 1] = IssueSlot::default();
        slot
    }

    /// Clears every slot.
    pub fn flush(&mut self) {
        for slot in &mut self.slots {
            slot.busy = false;
        }
    }

    /// Index of the oldest slot allowed to issue.
    ///
    /// Unordered stations pick the oldest operand-ready slot. The
    /// load/store station restricts stores: only the oldest store is ever a
    /// candidate, and because selection scans oldest-first, a ready oldest
    /// store is always picked ahead of any younger ready load. A ready load
    /// behind a *non-ready* store may still issue speculatively; the load
    /// buffer squashes it later if the store turns out to overlap.
    fn eligible_index(&self) -> Option<usize> {
        let mut seen_store = false;
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.busy {
                // Compaction keeps busy slots as a prefix.
                break;
            }
            if self.mem_ordered && slot.inst.is_store() {
                let oldest = !seen_store;
                seen_store = true;
                if oldest && slot.operands_ready() {
                    return Some(i);
                }
                continue;
            }
            if slot.operands_ready() {
                return Some(i);
            }
        }
        None
    }
}

impl<const N: usize> Default for ReservationStation<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Captures one source operand at dispatch.
fn capture_operand(r: usize, regfile: &RegisterFile, rob: &ReorderBuffer) -> RegReadPort {
    if !regfile.is_busy(r) {
        return RegReadPort {
            wait_for_wakeup: false,
            rob_idx: 0,
            value: regfile.read(r),
        };
    }
    let producer = regfile.busy_index(r);
    if rob.check_ready(producer) {
        RegReadPort {
            wait_for_wakeup: false,
            rob_idx: 0,
            value: rob.read(producer),
        }
    } else {
        RegReadPort {
            wait_for_wakeup: true,
            rob_idx: producer,
            value: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{BranchPredictBundle, Instruction};

    fn inst(raw: u32) -> Instruction {
        Instruction::new(raw, 0x8000_0000, BranchPredictBundle::default())
    }

    /// add x3, x1, x2
    const ADD_X3: u32 = 0x0020_81B3;
    /// lw x2, 0(x10)
    const LW_X2: u32 = 0x0005_2103;
    /// sw x2, 0(x10)
    const SW_X2: u32 = 0x0025_2023;

    #[test]
    fn captures_values_from_regfile() {
        let mut rs = ReservationStation::<4>::new();
        let mut rf = RegisterFile::new();
        let rob = ReorderBuffer::new();
        rf.functional_write(1, 5);
        rf.functional_write(2, 7);

        rs.insert(inst(ADD_X3), 0, &rf, &rob);
        assert!(rs.can_issue());
        let slot = rs.issue();
        assert_eq!(slot.port1.value, 5);
        assert_eq!(slot.port2.value, 7);
    }

    #[test]
    fn captures_completed_producer_from_rob() {
        let mut rs = ReservationStation::<4>::new();
        let mut rf = RegisterFile::new();
        let mut rob = ReorderBuffer::new();

        let producer = rob.push(inst(0x13), false);
        rf.mark_busy(1, producer);
        rob.write_state(&RobWritePort {
            result: 99,
            rob_idx: producer,
            ..RobWritePort::default()
        });

        rs.insert(inst(ADD_X3), 1, &rf, &rob);
        let slot = rs.issue();
        assert_eq!(slot.port1.value, 99);
        assert!(!slot.port1.wait_for_wakeup);
    }

    #[test]
    fn waits_then_wakes_on_broadcast() {
        let mut rs = ReservationStation::<4>::new();
        let mut rf = RegisterFile::new();
        let mut rob = ReorderBuffer::new();

        let producer = rob.push(inst(0x13), false);
        rf.mark_busy(1, producer);

        rs.insert(inst(ADD_X3), 1, &rf, &rob);
        assert!(!rs.can_issue());

        rs.wakeup(&RobWritePort {
            result: 123,
            rob_idx: producer,
            ..RobWritePort::default()
        });
        assert!(rs.can_issue());
        assert_eq!(rs.issue().port1.value, 123);
    }

    #[test]
    fn issues_oldest_ready_first() {
        let mut rs = ReservationStation::<4>::new();
        let mut rf = RegisterFile::new();
        let mut rob = ReorderBuffer::new();

        let producer = rob.push(inst(0x13), false);
        rf.functional_write(2, 7);
        rf.mark_busy(1, producer);

        // Oldest waits on x1; youngest is ready immediately.
        rs.insert(inst(ADD_X3), 1, &rf, &rob);
        rf.flush();
        rf.functional_write(1, 1);
        rs.insert(inst(ADD_X3), 2, &rf, &rob);

        assert_eq!(rs.issue().rob_idx, 2);
        rs.wakeup(&RobWritePort {
            rob_idx: producer,
            ..RobWritePort::default()
        });
        assert_eq!(rs.issue().rob_idx, 1);
    }

    #[test]
    fn fills_up_then_rejects() {
        let mut rs = ReservationStation::<2>::new();
        let rf = RegisterFile::new();
        let rob = ReorderBuffer::new();
        rs.insert(inst(ADD_X3), 0, &rf, &rob);
        assert!(rs.has_empty_slot());
        rs.insert(inst(ADD_X3), 1, &rf, &rob);
        assert!(!rs.has_empty_slot());
    }

    #[test]
    fn lsu_oldest_store_beats_younger_load() {
        let mut rs = ReservationStation::<4>::new_mem_ordered();
        let rf = RegisterFile::new();
        let rob = ReorderBuffer::new();

        // Both ready: the older store must issue first.
        rs.insert(inst(SW_X2), 0, &rf, &rob);
        rs.insert(inst(LW_X2), 1, &rf, &rob);
        assert_eq!(rs.issue().rob_idx, 0);
        assert_eq!(rs.issue().rob_idx, 1);
    }

    #[test]
    fn lsu_ready_load_passes_waiting_store() {
        let mut rs = ReservationStation::<4>::new_mem_ordered();
        let mut rf = RegisterFile::new();
        let mut rob = ReorderBuffer::new();

        let producer = rob.push(inst(0x13), false);
        rf.mark_busy(2, producer); // store data not ready
        rs.insert(inst(SW_X2), 1, &rf, &rob);
        rf.flush();
        rs.insert(inst(LW_X2), 2, &rf, &rob);

        // The younger load issues speculatively around the waiting store.
        assert_eq!(rs.issue().rob_idx, 2);
        assert!(!rs.can_issue());
        rs.wakeup(&RobWritePort {
            rob_idx: producer,
            ..RobWritePort::default()
        });
        assert_eq!(rs.issue().rob_idx, 1);
    }

    #[test]
    fn lsu_younger_store_waits_for_oldest_store() {
        let mut rs = ReservationStation::<4>::new_mem_ordered();
        let mut rf = RegisterFile::new();
        let mut rob = ReorderBuffer::new();

        let producer = rob.push(inst(0x13), false);
        rf.mark_busy(2, producer);
        rs.insert(inst(SW_X2), 1, &rf, &rob); // oldest store, waiting
        rf.flush();
        rf.functional_write(2, 9);
        rs.insert(inst(SW_X2), 2, &rf, &rob); // ready, but not oldest

        assert!(!rs.can_issue());
    }

    #[test]
    fn flush_clears_busy() {
        let mut rs = ReservationStation::<4>::new();
        let rf = RegisterFile::new();
        let rob = ReorderBuffer::new();
        rs.insert(inst(ADD_X3), 0, &rf, &rob);
        rs.flush();
        assert!(rs.has_empty_slot());
        assert!(!rs.can_issue());
    }
}
