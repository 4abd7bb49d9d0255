//! Cache replacement policies.
//!
//! Victim selection state is kept per set. Hits and fills feed the policy
//! differently: a hit only refreshes recency (LRU), while a completed fill
//! both installs the block as most-recently-used and, for FIFO, advances the
//! round-robin pointer.

/// First-in, first-out replacement.
pub mod fifo;

/// Least-recently-used replacement.
pub mod lru;

/// Pseudo-random replacement.
pub mod random;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use random::RandomPolicy;

use crate::config::ReplacePolicy;

/// Interface for victim selection and usage tracking.
pub trait ReplacementPolicy {
    /// A resident block was hit.
    fn touch(&mut self, set: usize, way: usize);

    /// A fill completed into `way`.
    fn filled(&mut self, set: usize, way: usize);

    /// Chooses the way to evict from `set`. Called once per miss; the
    /// cache latches the answer for the duration of the fill.
    fn victim(&mut self, set: usize) -> usize;
}

/// Instantiates the policy named by the configuration.
pub fn make_policy(kind: ReplacePolicy, sets: usize, ways: usize) -> Box<dyn ReplacementPolicy> {
    match kind {
        ReplacePolicy::Fifo => Box::new(FifoPolicy::new(sets, ways)),
        ReplacePolicy::Lru => Box::new(LruPolicy::new(sets, ways)),
        ReplacePolicy::Random => Box::new(RandomPolicy::new(sets, ways)),
    }
}
