//! Configuration system for the simulator.
//!
//! This module defines the structures used to parameterize a run:
//! 1. **Defaults:** baseline constants for memory latency and cache geometry.
//! 2. **Structures:** `SimConfig` with memory and data-cache sections.
//! 3. **Validation:** geometry checks (powers of two, size ceiling).
//!
//! Configuration is supplied as JSON (`--config` in the CLI) or built from
//! `SimConfig::default()` and adjusted field by field.

use serde::Deserialize;

use crate::common::constants::MAX_CACHE_SIZE;
use crate::common::SimError;

/// Default configuration constants.
mod defaults {
    /// Main memory service latency in cycles.
    pub const MEMORY_LATENCY: u32 = 3;

    /// Seed for the memory jitter PRNG.
    pub const MEMORY_SEED: u64 = 0;

    /// Default data-cache size in bytes (8 KiB).
    pub const CACHE_SIZE: usize = 8192;

    /// Default cache block size in bytes.
    pub const CACHE_BLOCK: usize = 32;

    /// Default cache associativity (2-way).
    pub const CACHE_WAYS: usize = 2;
}

/// Cache replacement policy algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacePolicy {
    /// Least Recently Used: evicts the block untouched for the longest time.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// First In First Out: evicts blocks in fill order (round-robin).
    #[serde(alias = "Fifo")]
    Fifo,
    /// Random: evicts a pseudo-randomly selected block.
    #[serde(alias = "Random")]
    Random,
}

/// Root configuration for a simulated processor.
///
/// # Examples
///
/// ```
/// use tomasim_core::config::SimConfig;
///
/// let config = SimConfig::default();
/// assert_eq!(config.memory.latency, 3);
/// assert!(!config.cache.enabled);
///
/// let json = r#"{
///     "memory": { "latency": 5 },
///     "cache": { "enabled": true, "size_bytes": 4096, "ways": 4 }
/// }"#;
/// let config: SimConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.memory.latency, 5);
/// assert_eq!(config.cache.ways, 4);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    /// Main memory timing.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// L1 data cache geometry. Disabled by default: loads and stores then go
    /// straight to main memory.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Frontend options.
    #[serde(default)]
    pub frontend: FrontendConfig,
}

impl SimConfig {
    /// Checks the whole configuration, returning the first violation found.
    pub fn validate(&self) -> Result<(), SimError> {
        self.cache.validate()
    }
}

/// Frontend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontendConfig {
    /// Attach the branch target buffer predictor. Off by default: the
    /// frontend then predicts fall-through and every taken transfer costs a
    /// commit-time flush.
    #[serde(default)]
    pub predictor: bool,
}

/// Main memory timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Service latency in cycles for a fresh request. Repeated or sequential
    /// word accesses bypass it.
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: u32,

    /// Seed for the ±1-cycle jitter PRNG. Runs are deterministic per seed.
    #[serde(default = "MemoryConfig::default_seed")]
    pub seed: u64,
}

impl MemoryConfig {
    /// Returns the default memory latency in cycles.
    fn default_latency() -> u32 {
        defaults::MEMORY_LATENCY
    }

    /// Returns the default jitter seed.
    fn default_seed() -> u64 {
        defaults::MEMORY_SEED
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            latency: defaults::MEMORY_LATENCY,
            seed: defaults::MEMORY_SEED,
        }
    }
}

/// L1 data cache configuration.
///
/// The cache is always word-ported and write-allocate; write-through versus
/// write-back and the replacement policy are selectable.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Enable the data cache. When false, the memory hierarchy is main
    /// memory alone.
    #[serde(default)]
    pub enabled: bool,

    /// Total cache size in bytes. Power of two, at most 16 KiB.
    #[serde(default = "CacheConfig::default_size")]
    pub size_bytes: usize,

    /// Block (line) size in bytes. Power of two, at least one word.
    #[serde(default = "CacheConfig::default_block")]
    pub block_bytes: usize,

    /// Associativity (number of ways). Power of two.
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: usize,

    /// Write-through (true) or write-back (false).
    #[serde(default)]
    pub write_through: bool,

    /// Replacement policy.
    #[serde(default)]
    pub policy: ReplacePolicy,
}

impl CacheConfig {
    /// Returns the default cache size in bytes.
    fn default_size() -> usize {
        defaults::CACHE_SIZE
    }

    /// Returns the default block size in bytes.
    fn default_block() -> usize {
        defaults::CACHE_BLOCK
    }

    /// Returns the default associativity.
    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }

    /// Number of sets implied by the geometry.
    pub fn sets(&self) -> usize {
        self.size_bytes / (self.block_bytes * self.ways)
    }

    /// Checks the geometry: every dimension a power of two, blocks hold at
    /// least one word, at least one set, and the size ceiling respected.
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.enabled {
            return Ok(());
        }
        for (name, v) in [
            ("size_bytes", self.size_bytes),
            ("block_bytes", self.block_bytes),
            ("ways", self.ways),
        ] {
            if v == 0 || !v.is_power_of_two() {
                return Err(SimError::Config(format!(
                    "cache {name} must be a nonzero power of two, got {v}"
                )));
            }
        }
        if self.size_bytes > MAX_CACHE_SIZE {
            return Err(SimError::Config(format!(
                "cache size {} exceeds the {MAX_CACHE_SIZE}-byte ceiling",
                self.size_bytes
            )));
        }
        if self.block_bytes < 4 {
            return Err(SimError::Config(format!(
                "cache block must hold at least one word, got {}",
                self.block_bytes
            )));
        }
        if self.block_bytes * self.ways > self.size_bytes {
            return Err(SimError::Config(format!(
                "cache geometry yields no sets: {} bytes / ({} x {})",
                self.size_bytes, self.block_bytes, self.ways
            )));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_bytes: defaults::CACHE_SIZE,
            block_bytes: defaults::CACHE_BLOCK,
            ways: defaults::CACHE_WAYS,
            write_through: false,
            policy: ReplacePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_cache_defaults_are_valid() {
        let mut config = SimConfig::default();
        config.cache.enabled = true;
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.sets(), 8192 / (32 * 2));
    }

    #[test]
    fn rejects_non_power_of_two_ways() {
        let mut config = SimConfig::default();
        config.cache.enabled = true;
        config.cache.ways = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_cache() {
        let mut config = SimConfig::default();
        config.cache.enabled = true;
        config.cache.size_bytes = 64 * 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_sub_word_blocks() {
        let mut config = SimConfig::default();
        config.cache.enabled = true;
        config.cache.block_bytes = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_policy_aliases() {
        let json = r#"{ "cache": { "enabled": true, "policy": "FIFO" } }"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cache.policy, ReplacePolicy::Fifo);
    }
}
