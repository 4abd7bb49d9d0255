//! RISC-V integer ABI register names.

/// ABI names of the 32 integer registers, indexed by register number.
pub const XREG_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1",
    "a2", "a3", "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// Return address register (`ra`).
pub const REG_RA: usize = 1;

/// Stack pointer register (`sp`).
pub const REG_SP: usize = 2;

/// First argument register (`a0`).
pub const REG_A0: usize = 10;

/// Second argument register (`a1`); the runner passes the guest-argument
/// base address here.
pub const REG_A1: usize = 11;
