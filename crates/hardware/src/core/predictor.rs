//! Branch target buffer predictor.
//!
//! A direct-mapped BTB with per-entry 2-bit saturating counters. The
//! frontend consults it at fetch to pick the next pc and to stamp each
//! instruction with the prediction the branch unit later checks against.
//! Training happens at commit from `BpuUpdateData`.

use crate::core::frontend::BpuUpdateData;
use crate::isa::BranchPredictBundle;

/// Number of BTB entries.
const BTB_SIZE: usize = 1024;

/// Counter value at and above which the entry predicts taken.
const TAKEN_THRESHOLD: u8 = 2;

#[derive(Clone, Copy, Default)]
struct BtbEntry {
    pc: u32,
    target: u32,
    counter: u8,
    valid: bool,
}

/// The branch predictor, an optional collaborator of the frontend.
pub struct BranchPredictor {
    table: Vec<BtbEntry>,
}

impl Default for BranchPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchPredictor {
    /// Creates an empty predictor.
    pub fn new() -> Self {
        Self {
            table: vec![BtbEntry::default(); BTB_SIZE],
        }
    }

    fn index(pc: u32) -> usize {
        ((pc >> 2) as usize) & (BTB_SIZE - 1)
    }

    /// Prediction for the instruction fetched at `pc`.
    pub fn predict(&self, pc: u32) -> BranchPredictBundle {
        let entry = self.table[Self::index(pc)];
        if entry.valid && entry.pc == pc && entry.counter >= TAKEN_THRESHOLD {
            BranchPredictBundle {
                taken: true,
                target: entry.target,
            }
        } else {
            BranchPredictBundle::default()
        }
    }

    /// Commit-time training.
    ///
    /// Conditional branches train the counter toward their actual
    /// direction; unconditional transfers (jumps, calls, returns) install
    /// with a strong counter so they predict taken immediately.
    pub fn update(&mut self, data: &BpuUpdateData) {
        let entry = &mut self.table[Self::index(data.pc)];
        let tracked = entry.valid && entry.pc == data.pc;

        if !data.is_branch {
            *entry = BtbEntry {
                pc: data.pc,
                target: data.jump_target,
                counter: 3,
                valid: true,
            };
            return;
        }

        if tracked {
            if data.branch_taken {
                entry.counter = (entry.counter + 1).min(3);
                entry.target = data.jump_target;
            } else {
                entry.counter = entry.counter.saturating_sub(1);
            }
        } else if data.branch_taken {
            *entry = BtbEntry {
                pc: data.pc,
                target: data.jump_target,
                counter: TAKEN_THRESHOLD,
                valid: true,
            };
        }
    }
}
