//! Load buffer: speculative-load ordering enforcement.
//!
//! Every load records its address here when it executes, in the slot named
//! by its own ROB index. When a store executes, `check` marks every
//! still-tracked load that is *younger* than the store and overlaps its
//! address at word granularity. Commit pops the slot and, if it was marked,
//! squashes the pipeline and refetches the load from its own pc.

use crate::common::constants::ROB_SIZE;
use crate::core::rob_order;

/// One tracked speculative load.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadBufferSlot {
    /// Load effective address.
    pub addr: u32,
    /// ROB index of the load (also the slot index).
    pub rob_idx: usize,
    /// Whether this slot is occupied.
    pub valid: bool,
    /// Set by an overlapping older store executing after this load.
    pub invalidate: bool,
}

/// Direct-mapped buffer: slot index == ROB index of the load.
pub struct LoadBuffer {
    buffer: [LoadBufferSlot; ROB_SIZE],
}

impl Default for LoadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBuffer {
    /// Creates an empty load buffer.
    pub fn new() -> Self {
        Self {
            buffer: [LoadBufferSlot::default(); ROB_SIZE],
        }
    }

    /// Records an executed load.
    pub fn push(&mut self, addr: u32, rob_idx: usize) {
        self.buffer[rob_idx] = LoadBufferSlot {
            addr,
            rob_idx,
            valid: true,
            invalidate: false,
        };
    }

    /// Releases the slot at load commit and returns it; the caller inspects
    /// `invalidate` to decide between writeback and squash.
    pub fn pop(&mut self, rob_idx: usize) -> LoadBufferSlot {
        let slot = self.buffer[rob_idx];
        self.buffer[rob_idx].valid = false;
        slot
    }

    /// Store-execution hook: marks every valid load strictly younger than
    /// the store (under the pop-pointer linearization) whose address
    /// overlaps the store's at word granularity.
    pub fn check(&mut self, store_addr: u32, store_rob_idx: usize, rob_pop_ptr: usize) {
        let store_ord = rob_order(store_rob_idx, rob_pop_ptr);
        for slot in &mut self.buffer {
            if slot.valid
                && rob_order(slot.rob_idx, rob_pop_ptr) > store_ord
                && slot.addr & !0x3 == store_addr & !0x3
            {
                slot.invalidate = true;
            }
        }
    }

    /// Clears every slot.
    pub fn flush(&mut self) {
        for slot in &mut self.buffer {
            slot.valid = false;
        }
    }
}
