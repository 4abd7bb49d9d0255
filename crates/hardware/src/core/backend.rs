//! The backend: one-tick orchestration of the out-of-order engine.
//!
//! A tick runs in a fixed order chosen so that the observable contracts
//! hold: pipelines step first (producing this tick's completions), then
//! ready reservation-station entries issue into freed pipelines, then the
//! completions fan out over the common data bus (wake-ups and ROB writes),
//! and finally the ROB head — including an entry that just completed this
//! tick — may commit. An operand woken this tick therefore issues no
//! earlier than the next tick, and an instruction dispatched this tick
//! (which happens after the backend's step) issues no earlier than the
//! next.
//!
//! Dispatch is all-or-nothing: the instruction enters the ROB and its
//! reservation station together or not at all, and the frontend holds it
//! on rejection.

use tracing::{debug, trace};

use crate::common::constants::{data_word_index, is_data_addr};
use crate::config::SimConfig;
use crate::core::execute::ExecutePipeline;
use crate::core::frontend::{BpuUpdateData, Frontend};
use crate::core::load_buffer::LoadBuffer;
use crate::core::regfile::RegisterFile;
use crate::core::reservation::ReservationStation;
use crate::core::rob::{ReorderBuffer, RobEntry, RobStatus};
use crate::core::store_buffer::StoreBuffer;
use crate::isa::opcodes::{extra, rv32i};
use crate::isa::{FuType, Instruction};
use crate::mem::{Cache, Memory};
use crate::stats::MemStats;

/// Reservation-station depth per functional unit.
const RS_SIZE: usize = 4;

/// The out-of-order backend.
pub struct Backend {
    alu: ExecutePipeline,
    bru: ExecutePipeline,
    lsu: ExecutePipeline,
    mul: ExecutePipeline,
    div: ExecutePipeline,

    rs_alu: ReservationStation<RS_SIZE>,
    rs_bru: ReservationStation<RS_SIZE>,
    rs_lsu: ReservationStation<RS_SIZE>,
    rs_mul: ReservationStation<RS_SIZE>,
    rs_div: ReservationStation<RS_SIZE>,

    rob: ReorderBuffer,
    store_buffer: StoreBuffer,
    load_buffer: LoadBuffer,

    memory: Memory,
    dcache: Option<Cache>,
    stats: MemStats,
}

impl Backend {
    /// Builds the backend from the configuration and initial data image.
    pub fn new(config: &SimConfig, data: &[u32]) -> Self {
        let mut memory = Memory::new(config.memory.latency, config.memory.seed);
        memory.functional_write(0, data);
        Self {
            alu: ExecutePipeline::new(FuType::Alu),
            bru: ExecutePipeline::new(FuType::Bru),
            lsu: ExecutePipeline::new(FuType::Lsu),
            mul: ExecutePipeline::new(FuType::Mul),
            div: ExecutePipeline::new(FuType::Div),
            rs_alu: ReservationStation::new(),
            rs_bru: ReservationStation::new(),
            rs_lsu: ReservationStation::new_mem_ordered(),
            rs_mul: ReservationStation::new(),
            rs_div: ReservationStation::new(),
            rob: ReorderBuffer::new(),
            store_buffer: StoreBuffer::new(),
            load_buffer: LoadBuffer::new(),
            memory,
            dcache: config
                .cache
                .enabled
                .then(|| Cache::new(&config.cache)),
            stats: MemStats::default(),
        }
    }

    /// Accepts a decoded instruction from the frontend.
    ///
    /// Checks ROB and target-station capacity first; on success the entry is
    /// pushed, inserted, and the destination register renamed. On failure
    /// nothing changes and the caller holds the instruction.
    pub fn dispatch_instruction(&mut self, inst: Instruction, regfile: &mut RegisterFile) -> bool {
        if !self.rob.can_push() {
            debug!("dispatch rejected: ROB full");
            return false;
        }
        let fu = inst.fu_type();
        let rd = inst.rd();

        if fu == FuType::None {
            // Consumes an ROB slot only; ready to commit immediately.
            let idx = self.rob.push(inst, true);
            regfile.mark_busy(rd, idx);
            return true;
        }

        let has_slot = match fu {
            FuType::Alu => self.rs_alu.has_empty_slot(),
            FuType::Bru => self.rs_bru.has_empty_slot(),
            FuType::Lsu => self.rs_lsu.has_empty_slot(),
            FuType::Mul => self.rs_mul.has_empty_slot(),
            FuType::Div => self.rs_div.has_empty_slot(),
            FuType::None => unreachable!(),
        };
        if !has_slot {
            debug!(unit = ?fu, "dispatch rejected: reservation station full");
            return false;
        }

        trace!(%inst, pc = inst.pc, "dispatch");
        let idx = self.rob.push(inst.clone(), false);
        match fu {
            FuType::Alu => self.rs_alu.insert(inst, idx, regfile, &self.rob),
            FuType::Bru => self.rs_bru.insert(inst, idx, regfile, &self.rob),
            FuType::Lsu => self.rs_lsu.insert(inst, idx, regfile, &self.rob),
            FuType::Mul => self.rs_mul.insert(inst, idx, regfile, &self.rob),
            FuType::Div => self.rs_div.insert(inst, idx, regfile, &self.rob),
            FuType::None => unreachable!(),
        }
        regfile.mark_busy(rd, idx);
        true
    }

    /// Advances the backend one tick. Returns true when EXIT commits.
    pub fn step(&mut self, frontend: &mut Frontend, regfile: &mut RegisterFile) -> bool {
        let pop_ptr = self.rob.pop_ptr();

        // Execute step for every pipeline; each may produce one completion.
        let completions = [
            self.alu
                .step(None, &mut self.memory, &mut self.load_buffer, &mut self.store_buffer, pop_ptr),
            self.bru
                .step(None, &mut self.memory, &mut self.load_buffer, &mut self.store_buffer, pop_ptr),
            self.mul
                .step(None, &mut self.memory, &mut self.load_buffer, &mut self.store_buffer, pop_ptr),
            self.div
                .step(None, &mut self.memory, &mut self.load_buffer, &mut self.store_buffer, pop_ptr),
            self.lsu.step(
                self.dcache.as_mut(),
                &mut self.memory,
                &mut self.load_buffer,
                &mut self.store_buffer,
                pop_ptr,
            ),
        ];

        // Issue into pipelines freed by this tick's execute step. Operands
        // woken below are not visible here, so a completion's consumers
        // issue next tick at the earliest.
        if self.rs_alu.can_issue() && self.alu.can_execute() {
            self.alu.execute(self.rs_alu.issue());
        }
        if self.rs_bru.can_issue() && self.bru.can_execute() {
            self.bru.execute(self.rs_bru.issue());
        }
        if self.rs_mul.can_issue() && self.mul.can_execute() {
            self.mul.execute(self.rs_mul.issue());
        }
        if self.rs_div.can_issue() && self.div.can_execute() {
            self.div.execute(self.rs_div.issue());
        }
        if self.rs_lsu.can_issue() && self.lsu.can_execute() {
            self.lsu.execute(self.rs_lsu.issue());
        }

        // Common data bus: fan each completion out to every station and the
        // ROB in the same tick.
        for w in completions.into_iter().flatten() {
            self.rs_alu.wakeup(&w);
            self.rs_bru.wakeup(&w);
            self.rs_lsu.wakeup(&w);
            self.rs_mul.wakeup(&w);
            self.rs_div.wakeup(&w);
            self.rob.write_state(&w);
        }

        // Commit observes the ROB state including this tick's writes.
        let head = match self.rob.front() {
            Some(front) if front.state.ready => Some(front.clone()),
            _ => None,
        };
        match head {
            Some(entry) => self.commit_instruction(&entry, frontend, regfile),
            None => false,
        }
    }

    /// Commits the ROB head. Returns true when the head is EXIT.
    fn commit_instruction(
        &mut self,
        entry: &RobEntry,
        frontend: &mut Frontend,
        regfile: &mut RegisterFile,
    ) -> bool {
        assert!(entry.state.ready, "commit of a non-ready ROB entry");
        let inst = &entry.inst;
        let pop_ptr = self.rob.pop_ptr();

        if *inst == extra::EXIT {
            debug!("EXIT committed");
            return true;
        }
        trace!(%inst, pc = inst.pc, "commit");

        match inst.fu_type() {
            FuType::Alu | FuType::Mul | FuType::Div | FuType::None => {
                regfile.write(inst.rd(), entry.state.result, pop_ptr);
                self.rob.pop();
            }
            FuType::Bru => {
                regfile.write(inst.rd(), entry.state.result, pop_ptr);
                self.rob.pop();
                frontend.bpu_backend_update(&bpu_update(inst, &entry.state));
                if entry.state.mispredict {
                    let target = if entry.state.actual_taken {
                        entry.state.jump_target
                    } else {
                        inst.pc.wrapping_add(4)
                    };
                    debug!(pc = inst.pc, target, "mispredict: redirect and flush");
                    frontend.jump(target);
                    self.flush(regfile);
                }
            }
            FuType::Lsu if inst.is_load() => {
                let tracked = self.load_buffer.pop(pop_ptr);
                if tracked.invalidate {
                    // The load ran ahead of an older overlapping store and
                    // read stale data: refetch from its own pc. The flush
                    // clears the ROB, so the entry is not popped here.
                    debug!(pc = inst.pc, "load ordering violation: squash and refetch");
                    frontend.jump(inst.pc);
                    self.flush(regfile);
                    return false;
                }
                regfile.write(inst.rd(), entry.state.result, pop_ptr);
                self.rob.pop();
                self.note_access(entry.state.cache_hit);
            }
            FuType::Lsu => {
                // Drain exactly one store per commit attempt; an unready
                // hierarchy leaves the ROB untouched for a retry next tick.
                let store = self.store_buffer.front();
                assert!(store.valid, "store commit without a store-buffer entry");
                match self.write_memory_hierarchy(store.addr, store.data, 0xF) {
                    None => return false,
                    Some(hit) => {
                        let _ = self.store_buffer.pop();
                        self.rob.pop();
                        self.note_access(hit);
                    }
                }
            }
        }
        false
    }

    /// Writes through the cache when one is configured, else straight to
    /// memory. `None` means the hierarchy has not completed the write.
    fn write_memory_hierarchy(&mut self, addr: u32, data: u32, byte_enable: u32) -> Option<bool> {
        assert!(
            is_data_addr(addr),
            "store drain outside the data region: {addr:#010x}"
        );
        match &mut self.dcache {
            Some(cache) => cache.write(addr, data, &mut self.memory, byte_enable),
            None => self
                .memory
                .write(data_word_index(addr), data, byte_enable)
                .then_some(true),
        }
    }

    /// Counts a commit-time memory access when a cache is configured.
    fn note_access(&mut self, hit: bool) {
        if self.dcache.is_some() {
            self.stats.record(hit);
        }
    }

    /// Squashes all speculative state: stations, pipelines, register
    /// renames, both memory-ordering buffers, the ROB, and any in-flight
    /// memory or cache request. Architectural register values and memory
    /// contents survive.
    pub fn flush(&mut self, regfile: &mut RegisterFile) {
        self.rs_alu.flush();
        self.rs_bru.flush();
        self.rs_lsu.flush();
        self.rs_mul.flush();
        self.rs_div.flush();

        self.alu.flush();
        self.bru.flush();
        self.lsu.flush();
        self.mul.flush();
        self.div.flush();

        regfile.flush();
        self.store_buffer.flush();
        self.load_buffer.flush();
        self.rob.flush();

        self.memory.reset_state();
        if let Some(cache) = &mut self.dcache {
            cache.reset_state();
        }
    }

    /// Harness read of data memory, preferring a resident cache block.
    pub fn read(&self, addr: u32) -> u32 {
        if let Some(cache) = &self.dcache {
            if let Some(word) = cache.peek(addr) {
                return word;
            }
        }
        self.memory.functional_read(data_word_index(addr), 1)[0]
    }

    /// Harness write of data memory (program setup).
    pub fn functional_write(&mut self, addr: u32, value: u32) {
        self.memory.functional_write(data_word_index(addr), &[value]);
    }

    /// Reinstalls the data image and clears all execution and cache state
    /// (program load).
    pub fn reset(&mut self, data: &[u32], regfile: &mut RegisterFile) {
        self.memory.functional_write(0, data);
        self.flush(regfile);
        if let Some(cache) = &mut self.dcache {
            cache.reset();
        }
        self.stats.reset();
    }

    /// Commit-time cache statistics.
    pub fn stats(&self) -> MemStats {
        self.stats
    }
}

/// Builds the commit-time predictor update for a branch-unit instruction.
fn bpu_update(inst: &Instruction, state: &RobStatus) -> BpuUpdateData {
    use crate::isa::abi::REG_RA;
    let is_jal = *inst == rv32i::JAL;
    let is_jalr = *inst == rv32i::JALR;
    BpuUpdateData {
        pc: inst.pc,
        is_call: is_jal && inst.rd() == REG_RA,
        is_return: is_jalr && inst.rs1() == REG_RA,
        is_branch: !is_jal && !is_jalr,
        branch_taken: state.actual_taken,
        jump_target: state.jump_target,
    }
}
