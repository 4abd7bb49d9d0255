//! Set-associative, write-allocate L1 data cache.
//!
//! Geometry comes from `CacheConfig`: size, block size, and associativity,
//! each a power of two. An address splits into offset, set index, and tag.
//! Replacement is delegated to a `ReplacementPolicy`.
//!
//! Timing model: hits complete in a single invocation. A miss pins the
//! cache on the requesting (address, direction) pair and services one word
//! per invocation — first writing back a dirty victim, then filling the
//! block from memory — so the caller retries every cycle until the request
//! completes. A non-matching request during an active miss gets "not yet"
//! without advancing anything. Write-through stores additionally wait for
//! the memory write to complete before reporting success.

/// Replacement policy implementations (FIFO, LRU, random).
pub mod policies;

use tracing::trace;

use self::policies::{make_policy, ReplacementPolicy};
use crate::common::constants::DATA_MEM_BASE;
use crate::config::{CacheConfig, ReplacePolicy};
use crate::mem::memory::Memory;

/// One cache line.
struct CacheBlock {
    tag: u32,
    data: Vec<u8>,
    valid: bool,
    dirty: bool,
}

impl CacheBlock {
    fn new(block_bytes: usize) -> Self {
        Self {
            tag: 0,
            data: vec![0; block_bytes],
            valid: false,
            dirty: false,
        }
    }
}

/// Progress of the pinned request.
#[derive(Clone, Copy, Debug)]
enum ReqState {
    /// Dirty victim draining to memory, one word per invocation.
    Writeback { way: usize, offset: usize },
    /// Block filling from memory, one word per invocation.
    Fill { way: usize, offset: usize },
    /// Write-through store hit waiting on the memory write.
    DrainHit { way: usize },
    /// Write-through store miss, fill done, waiting on the memory write.
    DrainFill { way: usize },
}

/// The in-flight request the cache is pinned on.
#[derive(Clone, Copy, Debug)]
struct Pinned {
    addr: u32,
    is_write: bool,
    state: ReqState,
}

/// A completed cache read.
#[derive(Clone, Copy, Debug)]
pub struct CacheAccess {
    /// The requested word.
    pub data: u32,
    /// True if the tag was resident without a fill.
    pub hit: bool,
}

/// The data cache.
pub struct Cache {
    sets: Vec<Vec<CacheBlock>>,
    block_bytes: usize,
    set_count: usize,
    ways: usize,
    write_through: bool,
    policy_kind: ReplacePolicy,
    policy: Box<dyn ReplacementPolicy>,
    request: Option<Pinned>,
}

impl Cache {
    /// Builds the cache described by `config` (validated by the caller).
    pub fn new(config: &CacheConfig) -> Self {
        let set_count = config.sets();
        Self {
            sets: (0..set_count)
                .map(|_| {
                    (0..config.ways)
                        .map(|_| CacheBlock::new(config.block_bytes))
                        .collect()
                })
                .collect(),
            block_bytes: config.block_bytes,
            set_count,
            ways: config.ways,
            write_through: config.write_through,
            policy_kind: config.policy,
            policy: make_policy(config.policy, set_count, config.ways),
            request: None,
        }
    }

    /// Timed read of the aligned word at `addr`.
    ///
    /// `None` means the request is still in service (or a different request
    /// holds the cache); retry next cycle.
    pub fn query(&mut self, addr: u32, memory: &mut Memory) -> Option<CacheAccess> {
        if let Some(req) = &self.request {
            if req.addr != addr || req.is_write {
                return None;
            }
        } else {
            let (set, tag, off) = self.split(addr);
            if let Some(way) = self.lookup(set, tag) {
                self.policy.touch(set, way);
                return Some(CacheAccess {
                    data: self.read_word(set, way, off),
                    hit: true,
                });
            }
            self.begin_miss(addr, false);
        }

        let way = self.service_miss(memory)?;
        let (set, _tag, off) = self.split(addr);
        let data = self.read_word(set, way, off);
        self.request = None;
        Some(CacheAccess { data, hit: false })
    }

    /// Timed write of `byte_enable`-gated bytes to the word at `addr`.
    ///
    /// `None` means not yet; `Some(hit)` reports completion and whether the
    /// tag was resident without a fill.
    pub fn write(
        &mut self,
        addr: u32,
        value: u32,
        memory: &mut Memory,
        byte_enable: u32,
    ) -> Option<bool> {
        if let Some(req) = &self.request {
            if req.addr != addr || !req.is_write {
                return None;
            }
        } else {
            let (set, tag, off) = self.split(addr);
            if let Some(way) = self.lookup(set, tag) {
                self.policy.touch(set, way);
                self.merge_word(set, way, off, value, byte_enable);
                if !self.write_through {
                    self.sets[set][way].dirty = true;
                    return Some(true);
                }
                if memory.write(word_index(addr), value, byte_enable) {
                    return Some(true);
                }
                self.request = Some(Pinned {
                    addr,
                    is_write: true,
                    state: ReqState::DrainHit { way },
                });
                return None;
            }
            self.begin_miss(addr, true);
        }

        let state = self.request.as_ref().map(|req| req.state);
        match state {
            Some(ReqState::DrainHit { .. }) => {
                // The block was merged on the hit path; only the memory
                // write remains.
                if memory.write(word_index(addr), value, byte_enable) {
                    self.request = None;
                    return Some(true);
                }
                None
            }
            Some(ReqState::DrainFill { .. }) => {
                if memory.write(word_index(addr), value, byte_enable) {
                    self.request = None;
                    return Some(false);
                }
                None
            }
            Some(ReqState::Writeback { .. } | ReqState::Fill { .. }) => {
                let way = self.service_miss(memory)?;
                let (set, _tag, off) = self.split(addr);
                self.merge_word(set, way, off, value, byte_enable);
                if !self.write_through {
                    self.sets[set][way].dirty = true;
                    self.request = None;
                    return Some(false);
                }
                if memory.write(word_index(addr), value, byte_enable) {
                    self.request = None;
                    return Some(false);
                }
                self.request = Some(Pinned {
                    addr,
                    is_write: true,
                    state: ReqState::DrainFill { way },
                });
                None
            }
            None => unreachable!("write serviced without a pinned request"),
        }
    }

    /// Pure lookup for the harness: no replacement update, no memory
    /// traffic. Returns the word if the tag is resident.
    pub fn peek(&self, addr: u32) -> Option<u32> {
        let (set, tag, off) = self.split(addr);
        self.sets[set]
            .iter()
            .find(|block| block.valid && block.tag == tag)
            .map(|block| word_at(&block.data, off))
    }

    /// Forgets the in-flight request (pipeline flush). A partially filled
    /// victim stays invalid; resident blocks are untouched.
    pub fn reset_state(&mut self) {
        self.request = None;
    }

    /// Clears every block and the replacement state (program load).
    pub fn reset(&mut self) {
        for set in &mut self.sets {
            for block in set.iter_mut() {
                block.valid = false;
                block.dirty = false;
                block.tag = 0;
            }
        }
        self.policy = make_policy(self.policy_kind, self.set_count, self.ways);
        self.request = None;
    }

    /// (set index, tag, word-aligned offset within the block) of `addr`.
    fn split(&self, addr: u32) -> (usize, u32, usize) {
        let block_bits = self.block_bytes.trailing_zeros();
        let set = ((addr >> block_bits) as usize) & (self.set_count - 1);
        let tag = (addr >> block_bits) >> self.set_count.trailing_zeros();
        let off = (addr as usize) & (self.block_bytes - 1) & !0x3;
        (set, tag, off)
    }

    fn lookup(&self, set: usize, tag: u32) -> Option<usize> {
        self.sets[set]
            .iter()
            .position(|block| block.valid && block.tag == tag)
    }

    fn read_word(&self, set: usize, way: usize, off: usize) -> u32 {
        word_at(&self.sets[set][way].data, off)
    }

    fn merge_word(&mut self, set: usize, way: usize, off: usize, value: u32, byte_enable: u32) {
        let data = &mut self.sets[set][way].data;
        for i in 0..4 {
            if byte_enable & (1 << i) != 0 {
                data[off + i] = (value >> (i * 8)) as u8;
            }
        }
    }

    /// Establishes the miss: picks and latches the victim, entering either
    /// the writeback or the fill phase.
    fn begin_miss(&mut self, addr: u32, is_write: bool) {
        let (set, _tag, _off) = self.split(addr);
        let way = self.policy.victim(set);
        let victim = &mut self.sets[set][way];
        let state = if victim.valid && victim.dirty {
            trace!(addr, set, way, "cache miss, dirty victim writeback");
            ReqState::Writeback { way, offset: 0 }
        } else {
            trace!(addr, set, way, "cache miss, filling");
            victim.valid = false;
            ReqState::Fill { way, offset: 0 }
        };
        self.request = Some(Pinned {
            addr,
            is_write,
            state,
        });
    }

    /// Advances the pinned miss by at most one word.
    ///
    /// Returns the victim way once the fill has completed (tag installed,
    /// block valid and clean). The writeback-to-fill transition consumes an
    /// invocation of its own.
    fn service_miss(&mut self, memory: &mut Memory) -> Option<usize> {
        let req = self.request.expect("no miss in service");
        let (set, tag, _off) = self.split(req.addr);
        match req.state {
            ReqState::Writeback { way, mut offset } => {
                let word = self.read_word(set, way, offset);
                let wb_addr = self.block_base(set, self.sets[set][way].tag) + offset as u32;
                if memory.write(word_index(wb_addr), word, 0xF) {
                    offset += 4;
                }
                if offset == self.block_bytes {
                    let victim = &mut self.sets[set][way];
                    victim.dirty = false;
                    victim.valid = false;
                    self.set_state(ReqState::Fill { way, offset: 0 });
                } else {
                    self.set_state(ReqState::Writeback { way, offset });
                }
                None
            }
            ReqState::Fill { way, mut offset } => {
                let fill_addr = (req.addr & !(self.block_bytes as u32 - 1)) + offset as u32;
                if let Some(word) = memory.read(word_index(fill_addr)) {
                    let data = &mut self.sets[set][way].data;
                    data[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
                    offset += 4;
                    if offset == self.block_bytes {
                        let block = &mut self.sets[set][way];
                        block.valid = true;
                        block.dirty = false;
                        block.tag = tag;
                        self.policy.filled(set, way);
                        return Some(way);
                    }
                }
                self.set_state(ReqState::Fill { way, offset });
                None
            }
            ReqState::DrainHit { .. } | ReqState::DrainFill { .. } => {
                unreachable!("drain states are handled by the write path")
            }
        }
    }

    fn set_state(&mut self, state: ReqState) {
        if let Some(req) = &mut self.request {
            req.state = state;
        }
    }

    /// Physical base address of the block holding `tag` in `set`.
    fn block_base(&self, set: usize, tag: u32) -> u32 {
        let set_bits = self.set_count.trailing_zeros();
        let block_bits = self.block_bytes.trailing_zeros();
        ((tag << set_bits) | set as u32) << block_bits
    }
}

/// Main-memory word index of a data-region byte address.
fn word_index(addr: u32) -> u32 {
    (addr - DATA_MEM_BASE) >> 2
}

/// Little-endian word at byte offset `off` of a block.
fn word_at(data: &[u8], off: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&data[off..off + 4]);
    u32::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    /// 2 sets x 2 ways x 16-byte blocks, instant memory.
    fn small_cache(write_through: bool, policy: ReplacePolicy) -> (Cache, Memory) {
        let config = CacheConfig {
            enabled: true,
            size_bytes: 64,
            block_bytes: 16,
            ways: 2,
            write_through,
            policy,
        };
        config.validate().unwrap();
        (Cache::new(&config), Memory::new(0, 0))
    }

    fn read_blocking(cache: &mut Cache, mem: &mut Memory, addr: u32) -> CacheAccess {
        for _ in 0..1000 {
            if let Some(access) = cache.query(addr, mem) {
                return access;
            }
        }
        panic!("cache read at {addr:#x} never completed");
    }

    fn write_blocking(cache: &mut Cache, mem: &mut Memory, addr: u32, value: u32) -> bool {
        for _ in 0..1000 {
            if let Some(hit) = cache.write(addr, value, mem, 0xF) {
                return hit;
            }
        }
        panic!("cache write at {addr:#x} never completed");
    }

    const A: u32 = 0x8040_0000;
    /// Same set as `A`, different tag (2 sets x 16-byte blocks = 32-byte
    /// period).
    const B: u32 = A + 0x20;
    const C: u32 = A + 0x40;

    #[test]
    fn miss_fills_then_hits() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        mem.functional_write(0, &[11, 22, 33, 44]);

        let access = read_blocking(&mut cache, &mut mem, A + 4);
        assert!(!access.hit);
        assert_eq!(access.data, 22);

        // The whole block is now resident.
        for (i, expect) in [11, 22, 33, 44].iter().enumerate() {
            let access = cache.query(A + 4 * i as u32, &mut mem).unwrap();
            assert!(access.hit);
            assert_eq!(access.data, *expect);
        }
    }

    #[test]
    fn fill_takes_one_word_per_invocation() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        let mut calls = 0;
        while cache.query(A, &mut mem).is_none() {
            calls += 1;
        }
        // 16-byte block, instant memory: three incomplete invocations, the
        // fourth transfers the last word and returns the data.
        assert_eq!(calls, 3);
    }

    #[test]
    fn mismatched_request_waits_for_the_pinned_one() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        assert!(cache.query(A, &mut mem).is_none()); // miss pinned
        assert!(cache.query(B, &mut mem).is_none());
        assert!(cache.write(A, 1, &mut mem, 0xF).is_none());
        // The pinned request still completes.
        let access = read_blocking(&mut cache, &mut mem, A);
        assert!(!access.hit);
    }

    #[test]
    fn write_back_defers_memory_update_until_eviction() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);

        assert!(!write_blocking(&mut cache, &mut mem, A, 0x1111_1111));
        // Memory still has the old word.
        assert_eq!(mem.functional_read(0, 1), vec![0]);

        // Fill the set's other way, then force the dirty victim out.
        let _ = read_blocking(&mut cache, &mut mem, B);
        let _ = read_blocking(&mut cache, &mut mem, C);
        assert_eq!(mem.functional_read(0, 1), vec![0x1111_1111]);

        // The evicted word reads back correctly through the cache.
        assert_eq!(read_blocking(&mut cache, &mut mem, A).data, 0x1111_1111);
    }

    #[test]
    fn write_through_updates_memory_immediately() {
        let (mut cache, mut mem) = small_cache(true, ReplacePolicy::Lru);
        assert!(!write_blocking(&mut cache, &mut mem, A, 0xABCD_EF01));
        assert_eq!(mem.functional_read(0, 1), vec![0xABCD_EF01]);

        // Hit path with byte enables merges into both block and memory.
        let (mut cache2, mut mem2) = small_cache(true, ReplacePolicy::Lru);
        let _ = write_blocking(&mut cache2, &mut mem2, A, 0xAABB_CCDD);
        for _ in 0..1000 {
            if let Some(hit) = cache2.write(A, 0x11, &mut mem2, 0x1) {
                assert!(hit);
                break;
            }
        }
        assert_eq!(mem2.functional_read(0, 1), vec![0xAABB_CC11]);
        assert_eq!(cache2.peek(A), Some(0xAABB_CC11));
    }

    #[test]
    fn lru_keeps_the_reused_block() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        mem.functional_write(word_index(A), &[0xA]);
        mem.functional_write(word_index(B), &[0xB]);
        mem.functional_write(word_index(C), &[0xC]);

        let _ = read_blocking(&mut cache, &mut mem, A);
        let _ = read_blocking(&mut cache, &mut mem, B);
        let _ = read_blocking(&mut cache, &mut mem, A); // refresh A
        let _ = read_blocking(&mut cache, &mut mem, C); // evicts B

        assert!(read_blocking(&mut cache, &mut mem, A).hit);
        assert!(!read_blocking(&mut cache, &mut mem, B).hit);
    }

    #[test]
    fn fifo_evicts_in_fill_order_despite_reuse() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Fifo);
        let _ = read_blocking(&mut cache, &mut mem, A);
        let _ = read_blocking(&mut cache, &mut mem, B);
        let _ = read_blocking(&mut cache, &mut mem, A); // hit, no FIFO effect
        let _ = read_blocking(&mut cache, &mut mem, C); // evicts A regardless

        assert!(!read_blocking(&mut cache, &mut mem, A).hit);
    }

    #[test]
    fn peek_is_pure() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        assert_eq!(cache.peek(A), None);
        mem.functional_write(0, &[5]);
        let _ = read_blocking(&mut cache, &mut mem, A);
        assert_eq!(cache.peek(A), Some(5));
        assert_eq!(cache.peek(B), None);
    }

    #[test]
    fn reset_state_drops_partial_fill() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        assert!(cache.query(A, &mut mem).is_none());
        cache.reset_state();
        // A different request is accepted right away.
        let access = read_blocking(&mut cache, &mut mem, B);
        assert!(!access.hit);
    }

    #[test]
    fn reset_clears_blocks() {
        let (mut cache, mut mem) = small_cache(false, ReplacePolicy::Lru);
        let _ = read_blocking(&mut cache, &mut mem, A);
        cache.reset();
        assert_eq!(cache.peek(A), None);
        assert!(!read_blocking(&mut cache, &mut mem, A).hit);
    }
}
