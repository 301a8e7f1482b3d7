//! # Cross-process shared memory segment pool
//!
//! A fixed set of equally-sized byte buffers backed by one named region
//! of shared memory, visible to multiple independent processes. A
//! producer claims a free segment, fills it, and hands the segment id to
//! a consumer through any out-of-band channel (queue, socket, file); the
//! consumer attaches to the same pool by name, reads the bytes, and
//! releases the segment.
//!
//! The pool stores raw bytes only -- shape, dtype and framing are the
//! caller's concern -- and the geometry (`segment_size`, `num_segments`)
//! is fixed at creation. Same-host only; there is no network transport.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────┐  ┌─────────────────────────────────────────────┐
//! │  Producer    │  │  /dev/shm/shm_pool_<name>                   │
//! │              ├─►│  [Header | Occupancy table | Seg 0..N-1]    │
//! │ get_free_    │  │            Free/Occupied, one atomic        │
//! │ segment()    │  │            byte per segment                 │
//! └──────┬───────┘  └─────────────────────▲───────────────────────┘
//!        │ segment id (external channel)  │
//! ┌──────▼───────┐                        │
//! │  Consumer    │  get_segment(id) ──────┘
//! └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use shm_pool::SegmentPool;
//!
//! # fn main() -> shm_pool::PoolResult<()> {
//! # let name = format!("doc_usage_{}", std::process::id());
//! # let _ = SegmentPool::unlink(&name);
//! // Producer process
//! let pool = SegmentPool::create(4096, 8, &name)?;
//! let segment = pool.get_free_segment().expect("pool exhausted");
//! segment.write(b"frame bytes")?;
//! let id = segment.id(); // travels over the hand-off channel
//!
//! // Consumer process (attaches to the same name)
//! let pool2 = SegmentPool::create(4096, 8, &name)?;
//! let segment = pool2.get_segment(id)?;
//! let bytes = segment.read();
//! segment.release()?;
//!
//! SegmentPool::unlink(&name)?;
//! # assert_eq!(&bytes[..11], b"frame bytes");
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees and limits
//!
//! - Occupancy transitions are compare-and-swap on atomics inside the
//!   mapped region, so exactly one process wins each claim, across
//!   process boundaries.
//! - `get_free_segment` never blocks or sleeps; `None` means "poll again
//!   with your own backoff".
//! - Ordering between a producer's `write` and a consumer's `read` is
//!   carried entirely by the external hand-off channel: send the id only
//!   after `write` returns.
//! - A process that crashes while holding a segment Occupied strands the
//!   slot; there is no lease or heartbeat. [`SegmentPool::reset`] is the
//!   administrative recovery.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod error;
pub mod occupancy;
pub mod platform;
pub mod pool;
pub mod region;
pub mod segment;

pub use discovery::{PoolInfo, find_pool, list_pools};
pub use error::{PoolError, PoolResult};
pub use occupancy::{OccupancyTable, SLOT_FREE, SLOT_OCCUPIED};
pub use pool::SegmentPool;
pub use region::{Region, RegionHeader, RegionLayout};
pub use segment::SegmentHandle;

/// Install the process-wide logging subscriber with the given filter
/// directives (e.g. `"info"` or `"shm_pool=debug"`).
///
/// Set once per process before constructing pools; later calls are
/// no-ops. Verbosity is purely diagnostic and never affects pool
/// behavior.
pub fn init_logging(directives: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Like [`init_logging`], taking the filter from `RUST_LOG`.
pub fn init_logging_from_env() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
