//! Error types for segment pool operations

use thiserror::Error;

/// Errors that can occur during segment pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// Pool geometry cannot be satisfied
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },

    /// Existing region disagrees with the requested geometry
    #[error("Size mismatch for pool `{name}`: expected {expected} bytes, region holds {actual}")]
    SizeMismatch {
        /// Pool name
        name: String,
        /// Region size implied by the caller's parameters
        expected: usize,
        /// Size recorded in the existing region
        actual: usize,
    },

    /// Region exists but does not carry a valid pool header
    #[error("Region `{name}` is not a valid segment pool")]
    InvalidRegion {
        /// Pool name
        name: String,
    },

    /// Segment id outside `[0, num_segments)`
    #[error("Invalid segment id {id} (pool holds {num_segments} segments)")]
    InvalidId {
        /// Offending id
        id: usize,
        /// Number of segments in the pool
        num_segments: usize,
    },

    /// Occupancy transition that the state machine forbids
    #[error("Invalid occupancy transition for segment {id}: slot already {state}")]
    InvalidTransition {
        /// Segment id
        id: usize,
        /// State the slot was found in
        state: &'static str,
    },

    /// Payload longer than the fixed segment capacity
    #[error("Buffer of {len} bytes exceeds segment capacity of {capacity} bytes")]
    BufferTooLarge {
        /// Payload length
        len: usize,
        /// Segment capacity in bytes
        capacity: usize,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for segment pool operations
pub type PoolResult<T> = Result<T, PoolError>;
