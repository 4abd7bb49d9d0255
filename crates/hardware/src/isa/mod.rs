//! Instruction set support for RV32I + M.
//!
//! This module provides:
//! 1. **Opcode literals:** masked 32-bit patterns for every supported
//!    instruction, plus the EXIT sentinel.
//! 2. **`Instruction`:** the decoded-on-demand instruction type carried
//!    through the pipeline, with format-aware field extraction and the
//!    `execute` semantics used by the functional units.
//! 3. **ABI names:** register naming for diagnostics.

/// ABI register names and well-known register indices.
pub mod abi;

/// The `Instruction` type, formats, functional-unit classification, and
/// execute semantics.
pub mod instruction;

/// Masked opcode literals for RV32I, RV32M, and the simulator extras.
pub mod opcodes;

pub use instruction::{
    BranchPredictBundle, ExecuteResult, FuType, InstrFormat, Instruction,
};
pub use opcodes::MaskedLiteral;
