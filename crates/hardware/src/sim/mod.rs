//! Simulation harness: program loading and execution.

/// ELF loading into instruction/data word images.
pub mod loader;
/// Program execution with argument passing and cycle counting.
pub mod runner;

pub use loader::{load_elf, ProgramImage};
pub use runner::{run_program, RunReport};
