//! Execute pipelines: per-unit latency countdown and result construction.
//!
//! Each functional unit owns one pipeline holding at most one issued slot.
//! `step` runs once per tick: it counts the unit latency down and, on
//! expiry, executes the instruction and returns the completion broadcast
//! for the common data bus.
//!
//! The LSU pipeline additionally drives the memory side: loads consult the
//! store buffer for forwarding before probing the cache/memory hierarchy
//! and register themselves in the load buffer; stores run the load-ordering
//! check, read the resident word, merge their data into it sub-word-wise,
//! and push the result into the store buffer. A hierarchy that answers
//! "not yet" leaves the pipeline busy with the counter at zero, so the
//! access retries every cycle until it completes.

use tracing::trace;

use crate::common::constants::{data_word_index, is_data_addr};
use crate::core::load_buffer::LoadBuffer;
use crate::core::reservation::IssueSlot;
use crate::core::rob::RobWritePort;
use crate::core::store_buffer::StoreBuffer;
use crate::isa::opcodes::rv32i;
use crate::isa::{FuType, Instruction};
use crate::mem::{Cache, Memory};

/// Execution latency of each functional unit in cycles.
fn unit_latency(unit: FuType) -> u32 {
    match unit {
        FuType::Alu | FuType::Bru => 1,
        FuType::Lsu => 2,
        FuType::Mul => 3,
        FuType::Div => 10,
        FuType::None => panic!("FuType::None has no execute pipeline"),
    }
}

/// A single-slot execute pipeline for one functional unit.
pub struct ExecutePipeline {
    unit: FuType,
    slot: IssueSlot,
    counter: u32,
}

impl ExecutePipeline {
    /// Creates an idle pipeline for `unit`.
    pub fn new(unit: FuType) -> Self {
        // Latency is checked here so a bad unit fails at construction.
        let _ = unit_latency(unit);
        Self {
            unit,
            slot: IssueSlot::default(),
            counter: 0,
        }
    }

    /// True if a new slot can be accepted.
    pub fn can_execute(&self) -> bool {
        !self.slot.busy
    }

    /// Accepts an issued slot and arms the latency counter. Panics if the
    /// pipeline is still busy.
    pub fn execute(&mut self, slot: IssueSlot) {
        assert!(
            !self.slot.busy,
            "{:?} pipeline accepted a slot while busy",
            self.unit
        );
        self.counter = unit_latency(self.unit);
        self.slot = slot;
        self.slot.busy = true;
    }

    /// Drops the in-flight slot (pipeline flush).
    pub fn flush(&mut self) {
        self.slot.busy = false;
    }

    /// Advances one cycle, producing a completion broadcast when the
    /// instruction finishes.
    ///
    /// `rob_pop_ptr` anchors the program-order comparisons of the store
    /// buffer and the load-ordering check.
    pub fn step(
        &mut self,
        cache: Option<&mut Cache>,
        memory: &mut Memory,
        load_buffer: &mut LoadBuffer,
        store_buffer: &mut StoreBuffer,
        rob_pop_ptr: usize,
    ) -> Option<RobWritePort> {
        if !self.slot.busy {
            return None;
        }
        self.counter = self.counter.saturating_sub(1);
        if self.counter > 0 {
            return None;
        }

        let inst = self.slot.inst.clone();
        let exe = inst.execute(self.unit, self.slot.port1.value, self.slot.port2.value);
        let mut w = RobWritePort {
            result: exe.result,
            mispredict: exe.mispredict,
            actual_taken: exe.actual_taken,
            jump_target: exe.jump_target,
            rob_idx: self.slot.rob_idx,
            cache_hit: true,
        };

        if self.unit != FuType::Lsu {
            self.slot.busy = false;
            trace!(unit = ?self.unit, rob_idx = w.rob_idx, result = w.result, "complete");
            return Some(w);
        }

        let addr = exe.result;
        if inst.is_load() {
            let (word, hit) = match store_buffer.query(addr, self.slot.rob_idx, rob_pop_ptr) {
                // Forwarded data counts as a cache hit for the statistics.
                Some(word) => (word, true),
                None => hierarchy_read(addr, cache, memory)?,
            };
            load_buffer.push(addr, self.slot.rob_idx);
            self.slot.busy = false;
            w.result = extract_load(&inst, addr, word);
            w.cache_hit = hit;
            trace!(rob_idx = w.rob_idx, addr, value = w.result, "load complete");
            Some(w)
        } else {
            // A store executing after a younger load to the same word means
            // that load read stale data; mark it for a commit-time squash.
            load_buffer.check(addr, self.slot.rob_idx, rob_pop_ptr);

            let (word, hit) = match store_buffer.query(addr, self.slot.rob_idx, rob_pop_ptr) {
                Some(word) => (word, true),
                None => hierarchy_read(addr, cache, memory)?,
            };
            let merged = merge_store(&inst, addr, word, self.slot.port2.value);
            store_buffer.push(addr, merged, self.slot.rob_idx);
            self.slot.busy = false;
            w.result = addr;
            w.cache_hit = hit;
            trace!(rob_idx = w.rob_idx, addr, value = merged, "store complete");
            Some(w)
        }
    }
}

/// Reads the word containing `addr` from the cache when present, else main
/// memory. `None` keeps the pipeline busy for a retry next cycle; an
/// address outside the data region never completes (the guest hangs, per
/// the architecture's fault model).
fn hierarchy_read(
    addr: u32,
    cache: Option<&mut Cache>,
    memory: &mut Memory,
) -> Option<(u32, bool)> {
    if !is_data_addr(addr) {
        trace!(addr, "access outside the data region; stalling");
        return None;
    }
    match cache {
        Some(cache) => cache
            .query(addr & !0x3, memory)
            .map(|access| (access.data, access.hit)),
        None => memory.read(data_word_index(addr)).map(|word| (word, true)),
    }
}

/// Slices and extends the memory word per the load opcode and the low
/// address bits.
fn extract_load(inst: &Instruction, addr: u32, word: u32) -> u32 {
    if *inst == rv32i::LW {
        word
    } else if *inst == rv32i::LH || *inst == rv32i::LHU {
        let half = if addr & 0x2 != 0 {
            word >> 16
        } else {
            word & 0xFFFF
        };
        if *inst == rv32i::LH && half & 0x8000 != 0 {
            half | 0xFFFF_0000
        } else {
            half
        }
    } else {
        let shift = (addr & 0x3) * 8;
        let byte = (word >> shift) & 0xFF;
        if *inst == rv32i::LB && byte & 0x80 != 0 {
            byte | 0xFFFF_FF00
        } else {
            byte
        }
    }
}

/// Merges store data into the currently resident word per the store opcode
/// and the low address bits.
fn merge_store(inst: &Instruction, addr: u32, word: u32, data: u32) -> u32 {
    if *inst == rv32i::SW {
        data
    } else if *inst == rv32i::SH {
        if addr & 0x2 != 0 {
            (word & 0x0000_FFFF) | (data << 16)
        } else {
            (word & 0xFFFF_0000) | (data & 0xFFFF)
        }
    } else {
        let shift = (addr & 0x3) * 8;
        (word & !(0xFF << shift)) | ((data & 0xFF) << shift)
    }
}
