//! Error types for the simulator's fallible surface.
//!
//! Only the harness-facing operations (loading, configuration, running) are
//! fallible. Contract violations inside the core — popping an empty ROB,
//! inserting into a full reservation station, committing a non-ready entry —
//! are programmer bugs and abort with a panic instead of propagating.

use thiserror::Error;

/// Errors surfaced by the loader, configuration validation, and the runner.
#[derive(Debug, Error)]
pub enum SimError {
    /// The program file could not be read.
    #[error("failed to read program file: {0}")]
    Io(#[from] std::io::Error),

    /// The program file is not a parseable object file.
    #[error("failed to parse ELF: {0}")]
    Elf(#[from] object::read::Error),

    /// The ELF is not a 32-bit little-endian RISC-V image.
    #[error("not a RISC-V rv32 little-endian ELF (found {0})")]
    WrongMachine(String),

    /// A loadable section falls outside the simulated address map.
    #[error("bad program image: {0}")]
    BadImage(String),

    /// A cache or memory configuration field is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The guest ran past the configured cycle limit without committing EXIT.
    #[error("cycle limit of {0} exceeded (guest hang?)")]
    CycleLimit(u64),
}
