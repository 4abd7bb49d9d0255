//! System-wide constants.
//!
//! The address map is fixed: instructions occupy a 4 MiB window at
//! 0x8000_0000 and data a 4 MiB window at 0x8040_0000. Guest binaries are
//! linked against these addresses, so they are not configurable.

/// Base address of the instruction memory region.
pub const INST_MEM_BASE: u32 = 0x8000_0000;

/// Size of the instruction memory region in bytes (4 MiB).
pub const INST_MEM_SIZE: u32 = 0x40_0000;

/// Base address of the data memory region.
pub const DATA_MEM_BASE: u32 = 0x8040_0000;

/// Size of the data memory region in bytes (4 MiB).
pub const DATA_MEM_SIZE: u32 = 0x40_0000;

/// One-past-the-end of the data memory region.
pub const DATA_MEM_END: u32 = DATA_MEM_BASE + DATA_MEM_SIZE;

/// Number of reorder-buffer slots. Must be a power of two: ROB indices wrap
/// modulo this value and the load buffer is indexed directly by them.
pub const ROB_SIZE: usize = 16;

/// Largest configurable data-cache size in bytes (16 KiB).
pub const MAX_CACHE_SIZE: usize = 16 * 1024;

/// Base address where the runner places guest program arguments; the guest
/// receives this address in `a1`.
pub const ARG_BASE: u32 = 0x807F_FF00;

/// The EXIT sentinel: a reserved custom-0 encoding that guest programs emit
/// via an inline assembly directive. Committing it terminates the run. The
/// encoding must stay bit-exact for guest compatibility.
pub const EXIT_INSTRUCTION: u32 = 0x0000_000b;

/// Returns true if `addr` lies inside the data memory region.
#[inline]
pub fn is_data_addr(addr: u32) -> bool {
    (DATA_MEM_BASE..DATA_MEM_END).contains(&addr)
}

/// Translates a data-region byte address to a word index into main memory.
///
/// Callers must check `is_data_addr` first; the subtraction wraps otherwise.
#[inline]
pub fn data_word_index(addr: u32) -> u32 {
    (addr - DATA_MEM_BASE) >> 2
}
