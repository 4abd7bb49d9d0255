//! Common constants and error types shared across the simulator.

/// System-wide constants: address map, buffer sizes, sentinel encodings.
pub mod constants;

/// Error types for configuration, loading, and simulation.
pub mod error;

pub use error::SimError;
