//! Process-local handle over one segment of the pool
//!
//! A handle is a thin view: the region owns the bytes, the handle only
//! carries the id and mutates the shared occupancy cell for that id.
//! Handles are created per logical use and never persisted.

use crate::error::{PoolError, PoolResult};
use crate::occupancy::OccupancyTable;
use crate::pool::SegmentPool;
use std::sync::atomic::{Ordering, fence};
use tracing::debug;

/// Handle bound to one segment id of an attached pool
pub struct SegmentHandle<'p> {
    pool: &'p SegmentPool,
    id: usize,
}

impl<'p> SegmentHandle<'p> {
    pub(crate) fn new(pool: &'p SegmentPool, id: usize) -> Self {
        Self { pool, id }
    }

    /// Segment id, the value carried over the external hand-off channel
    pub fn id(&self) -> usize {
        self.id
    }

    /// Segment capacity in bytes
    pub fn capacity(&self) -> usize {
        self.pool.segment_size()
    }

    /// Copy `bytes` into the segment payload.
    ///
    /// Fails with `BufferTooLarge` when the payload exceeds the segment
    /// capacity; shorter payloads leave the tail bytes untouched. Only
    /// valid while the caller holds the segment Occupied -- the pool does
    /// not police this, per the ownership rules of the occupancy table.
    pub fn write(&self, bytes: &[u8]) -> PoolResult<()> {
        let capacity = self.capacity();
        if bytes.len() > capacity {
            return Err(PoolError::BufferTooLarge {
                len: bytes.len(),
                capacity,
            });
        }

        debug!(id = self.id, len = bytes.len(), "write to segment");
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.pool.region().segment_ptr(self.id),
                bytes.len(),
            );
        }
        // Payload must be visible before the id travels to a consumer
        fence(Ordering::Release);
        Ok(())
    }

    /// Copy out the full `segment_size` bytes of the payload.
    ///
    /// The pool stores raw bytes only; reinterpreting them (shape,
    /// element type) is the caller's concern.
    pub fn read(&self) -> Vec<u8> {
        fence(Ordering::Acquire);
        let mut out = vec![0u8; self.capacity()];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.pool.region().segment_ptr(self.id),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        debug!(id = self.id, len = out.len(), "read from segment");
        out
    }

    /// Zero-copy view of the payload.
    ///
    /// The bytes can be rewritten by whichever process holds the segment
    /// Occupied; callers needing a stable snapshot should use [`read`].
    ///
    /// [`read`]: SegmentHandle::read
    pub fn bytes(&self) -> &[u8] {
        fence(Ordering::Acquire);
        unsafe {
            std::slice::from_raw_parts(self.pool.region().segment_ptr(self.id), self.capacity())
        }
    }

    /// Explicitly claim this segment.
    ///
    /// Handles returned by `get_free_segment` are already claimed; this
    /// path exists for handles obtained by id through `get_segment`.
    /// Fails with `InvalidTransition` if the slot is already Occupied.
    pub fn occupy(&self) -> PoolResult<()> {
        let table = OccupancyTable::new(self.pool.region());
        if table.try_claim(self.id)? {
            Ok(())
        } else {
            Err(PoolError::InvalidTransition {
                id: self.id,
                state: "Occupied",
            })
        }
    }

    /// Release this segment back to the pool.
    ///
    /// Called by the consumer after its `read`. Double release fails with
    /// `InvalidTransition` and leaves the slot Free.
    pub fn release(&self) -> PoolResult<()> {
        OccupancyTable::new(self.pool.region()).release(self.id)
    }

    /// Whether this segment is currently held Occupied by some process
    pub fn is_occupied(&self) -> bool {
        OccupancyTable::new(self.pool.region())
            .is_occupied(self.id)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SegmentHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentHandle")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("occupied", &self.is_occupied())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SegmentPool;

    fn test_pool(tag: &str, segment_size: usize, num_segments: usize) -> SegmentPool {
        let name = format!("{}_{}", tag, std::process::id());
        let _ = SegmentPool::unlink(&name);
        SegmentPool::create(segment_size, num_segments, &name).unwrap()
    }

    #[test]
    fn test_write_read_round_trip() {
        let pool = test_pool("seg_round_trip", 64, 1);
        let handle = pool.get_free_segment().unwrap();

        let payload: Vec<u8> = (0..64).collect();
        handle.write(&payload).unwrap();
        assert_eq!(handle.read(), payload);
        assert_eq!(handle.bytes(), &payload[..]);

        SegmentPool::unlink(pool.name()).unwrap();
    }

    #[test]
    fn test_write_boundaries() {
        let pool = test_pool("seg_boundaries", 32, 1);
        let handle = pool.get_free_segment().unwrap();

        // Exactly capacity succeeds
        handle.write(&[0xAB; 32]).unwrap();
        // One byte over fails
        let err = handle.write(&[0xAB; 33]).unwrap_err();
        assert!(matches!(
            err,
            PoolError::BufferTooLarge { len: 33, capacity: 32 }
        ));
        // Failed write leaves the previous payload intact
        assert_eq!(handle.read(), vec![0xAB; 32]);

        SegmentPool::unlink(pool.name()).unwrap();
    }

    #[test]
    fn test_short_write_keeps_tail() {
        let pool = test_pool("seg_short_write", 8, 1);
        let handle = pool.get_free_segment().unwrap();

        handle.write(&[0xFF; 8]).unwrap();
        handle.write(&[0x01; 4]).unwrap();
        assert_eq!(handle.read(), vec![0x01, 0x01, 0x01, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]);

        SegmentPool::unlink(pool.name()).unwrap();
    }

    #[test]
    fn test_occupy_conflict() {
        let pool = test_pool("seg_occupy_conflict", 16, 1);
        let producer = pool.get_free_segment().unwrap();

        // A second claim of the same id must be rejected
        let by_id = pool.get_segment(producer.id()).unwrap();
        let err = by_id.occupy().unwrap_err();
        assert!(matches!(err, PoolError::InvalidTransition { .. }));

        by_id.release().unwrap();
        // After release the explicit claim works
        by_id.occupy().unwrap();

        SegmentPool::unlink(pool.name()).unwrap();
    }
}
