//! Tomasulo-style out-of-order RISC-V (RV32IM) processor simulator.
//!
//! This crate implements a cycle-driven functional simulator of a single-issue
//! out-of-order core with:
//! 1. **Backend:** reorder buffer, per-unit reservation stations with operand
//!    capture and common-data-bus wake-up, execute pipelines with per-unit
//!    latencies, a store buffer with store-to-load forwarding, and a load
//!    buffer enforcing speculative-load ordering.
//! 2. **Memory:** a latency-modeled single-port main memory and an optional
//!    set-associative L1 data cache (write-through or write-back, with
//!    FIFO/LRU/random replacement) in front of it.
//! 3. **Frontend:** a fetch/decode delay line with an optional branch
//!    predictor, treated by the backend as an opaque instruction source.
//! 4. **Simulation:** ELF loading, program execution with guest arguments,
//!    cycle counting, and cache hit-rate reporting.

/// Common constants and error types.
pub mod common;
/// Simulator configuration (memory latency, cache geometry).
pub mod config;
/// Processor core: ROB, reservation stations, execute pipelines, buffers,
/// register file, frontend, backend, and the composed processor.
pub mod core;
/// Instruction set: masked opcode literals, the `Instruction` type, and
/// execute semantics for RV32I + M.
pub mod isa;
/// Memory hierarchy: latency-modeled main memory and the L1 data cache.
pub mod mem;
/// Simulation harness: ELF loader and program runner.
pub mod sim;
/// Run statistics (cycles, cache accesses and hits).
pub mod stats;

pub use crate::config::SimConfig;
pub use crate::core::processor::Processor;
pub use crate::sim::loader::ProgramImage;
pub use crate::sim::runner::{run_program, RunReport};
