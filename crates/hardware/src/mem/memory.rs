//! Latency-modeled single-port main memory.
//!
//! The array backs the 4 MiB data region and is word-addressed: index `i`
//! holds the word at byte address `DATA_MEM_BASE + 4*i`. One request may be
//! in flight at a time; a non-matching request while busy returns "not yet"
//! without disturbing it.
//!
//! Service time for a fresh request is `latency − 1` cycles plus a ±1 jitter
//! drawn from a seeded PRNG (floored at zero). Re-requesting the word just
//! served, or the next sequential word, completes immediately while idle —
//! a primitive streaming-friendly fast path that cache fills rely on.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::constants::DATA_MEM_SIZE;

/// The last request accepted by the memory port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Request {
    /// Word index.
    word: u32,
    /// Write (true) or read (false).
    write: bool,
}

/// Word-addressed main memory with a single outstanding request.
pub struct Memory {
    data: Vec<u32>,
    last: Option<Request>,
    remaining: u32,
    latency: u32,
    rng: StdRng,
}

impl Memory {
    /// Creates a zeroed memory with the given service latency and jitter
    /// seed.
    pub fn new(latency: u32, seed: u64) -> Self {
        Self {
            data: vec![0; (DATA_MEM_SIZE >> 2) as usize],
            last: None,
            remaining: 0,
            latency,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of words in the array.
    pub fn len_words(&self) -> u32 {
        self.data.len() as u32
    }

    /// Timed read of the word at `word` index.
    ///
    /// Returns `None` while the request (or a conflicting one) is still in
    /// service. Out-of-range indices never complete.
    pub fn read(&mut self, word: u32) -> Option<u32> {
        if word >= self.len_words() {
            return None;
        }
        let request = Request { word, write: false };

        if self.remaining != 0 {
            if self.last != Some(request) {
                return None;
            }
            self.remaining -= 1;
            return (self.remaining == 0).then(|| self.data[word as usize]);
        }

        // Repeated or next-sequential access streams with zero wait.
        if let Some(last) = self.last {
            if word == last.word || word == last.word + 1 {
                self.last = Some(request);
                return Some(self.data[word as usize]);
            }
        }

        self.last = Some(request);
        self.remaining = self.service_time();
        (self.remaining == 0).then(|| self.data[word as usize])
    }

    /// Timed write of `byte_enable`-gated bytes of `value` to `word`.
    ///
    /// Returns false while in service. Writing out of range is a bug in the
    /// caller: every guest-visible path range-checks first.
    pub fn write(&mut self, word: u32, value: u32, byte_enable: u32) -> bool {
        assert!(
            word < self.len_words(),
            "memory write out of range: word index {word:#x}"
        );
        let request = Request { word, write: true };

        if self.remaining != 0 {
            if self.last != Some(request) {
                return false;
            }
            self.remaining -= 1;
            if self.remaining == 0 {
                self.merge(word, value, byte_enable);
                return true;
            }
            return false;
        }

        self.last = Some(request);
        self.remaining = self.service_time();
        if self.remaining == 0 {
            self.merge(word, value, byte_enable);
            return true;
        }
        false
    }

    /// Untimed write used for program loading and verification.
    pub fn functional_write(&mut self, word: u32, values: &[u32]) {
        for (i, &v) in values.iter().enumerate() {
            let idx = word as usize + i;
            if idx < self.data.len() {
                self.data[idx] = v;
            }
        }
    }

    /// Untimed read used for verification; out-of-range words read zero.
    pub fn functional_read(&self, word: u32, len: u32) -> Vec<u32> {
        (0..len)
            .map(|i| {
                self.data
                    .get((word + i) as usize)
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Abandons the in-flight request (pipeline flush). The last-served
    /// address survives so the streaming fast path does too.
    pub fn reset_state(&mut self) {
        self.remaining = 0;
    }

    fn service_time(&mut self) -> u32 {
        let jitter: i32 = self.rng.gen_range(-1..=1);
        (self.latency as i32 - 1 + jitter).max(0) as u32
    }

    fn merge(&mut self, word: u32, value: u32, byte_enable: u32) {
        let old = self.data[word as usize];
        let mut out = 0u32;
        for i in 0..4 {
            let lane = 0xFF << (i * 8);
            if byte_enable & (1 << i) != 0 {
                out |= value & lane;
            } else {
                out |= old & lane;
            }
        }
        self.data[word as usize] = out;
    }
}
