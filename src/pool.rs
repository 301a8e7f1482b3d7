//! Pool manager: the single constructor point for every process
//!
//! A `SegmentPool` opens or creates the backing region for a name and
//! hands out [`SegmentHandle`]s. Producers call `get_free_segment`,
//! forward the id through an external channel, and consumers attach by
//! name and call `get_segment(id)`.

use crate::discovery;
use crate::error::{PoolError, PoolResult};
use crate::occupancy::OccupancyTable;
use crate::region::Region;
use crate::segment::SegmentHandle;
use tracing::info;

/// Cross-process pool of equally-sized shared memory segments
pub struct SegmentPool {
    region: Region,
}

impl SegmentPool {
    /// Open or create the pool named `name`.
    ///
    /// The first process to reference the name creates the region sized
    /// for `segment_size * num_segments` plus metadata and marks every
    /// slot Free; later processes attach and trust the existing
    /// occupancy state. Geometry must match across all attachers
    /// (`SizeMismatch` otherwise).
    pub fn create(segment_size: usize, num_segments: usize, name: &str) -> PoolResult<Self> {
        if segment_size == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "segment_size must be positive".to_string(),
            });
        }
        if num_segments == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "num_segments must be positive".to_string(),
            });
        }
        if name.is_empty() || name.contains('/') {
            return Err(PoolError::InvalidConfig {
                reason: format!("invalid pool name `{}`", name),
            });
        }

        let region = Region::open_or_create(name, segment_size, num_segments)?;
        if region.was_created() {
            discovery::write_pool_metadata(&region)?;
        }
        info!(
            name,
            segment_size,
            num_segments,
            created = region.was_created(),
            "segment pool ready"
        );
        Ok(Self { region })
    }

    /// Claim the lowest-indexed Free segment, if any.
    ///
    /// Scan and claim are a single atomic step per slot, so two
    /// processes can never win the same segment. Returns `None` without
    /// blocking when the table is exhausted; polling and backoff are the
    /// caller's choice.
    pub fn get_free_segment(&self) -> Option<SegmentHandle<'_>> {
        OccupancyTable::new(&self.region)
            .claim_first_free()
            .map(|id| SegmentHandle::new(self, id))
    }

    /// Handle for an already-known id, occupancy state untouched.
    ///
    /// This is the consumer-side entry point once a producer has
    /// communicated the id. Fails with `InvalidId` when `id` is outside
    /// `[0, num_segments)`.
    pub fn get_segment(&self, id: usize) -> PoolResult<SegmentHandle<'_>> {
        if id >= self.region.num_segments() {
            return Err(PoolError::InvalidId {
                id,
                num_segments: self.region.num_segments(),
            });
        }
        Ok(SegmentHandle::new(self, id))
    }

    /// Bytes per segment
    pub fn segment_size(&self) -> usize {
        self.region.segment_size()
    }

    /// Number of segments
    pub fn num_segments(&self) -> usize {
        self.region.num_segments()
    }

    /// Pool name
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Whether this process created the backing region (vs attached)
    pub fn created_region(&self) -> bool {
        self.region.was_created()
    }

    /// Number of Free segments at the instant of the scan (diagnostic)
    pub fn free_segments(&self) -> usize {
        OccupancyTable::new(&self.region).free_slots()
    }

    /// Force every slot back to Free.
    ///
    /// Administrative recovery for slots stranded by a crashed holder.
    /// There is no lease mechanism, so this is the only way to reclaim
    /// them; only safe while no process is actively claiming.
    pub fn reset(&self) {
        OccupancyTable::new(&self.region).reset();
    }

    /// Remove the named pool from the OS.
    ///
    /// Distinct from dropping a `SegmentPool`, which only unmaps the
    /// local view. Attached processes keep their mappings until they
    /// drop them; no new process can attach afterwards.
    pub fn unlink(name: &str) -> PoolResult<()> {
        discovery::remove_pool_metadata(name)?;
        Region::unlink(name)
    }

    pub(crate) fn region(&self) -> &Region {
        &self.region
    }
}

impl std::fmt::Debug for SegmentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentPool")
            .field("name", &self.name())
            .field("segment_size", &self.segment_size())
            .field("num_segments", &self.num_segments())
            .field("free_segments", &self.free_segments())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            SegmentPool::create(0, 4, "zero_size"),
            Err(PoolError::InvalidConfig { .. })
        ));
        assert!(matches!(
            SegmentPool::create(64, 0, "zero_count"),
            Err(PoolError::InvalidConfig { .. })
        ));
        assert!(matches!(
            SegmentPool::create(64, 4, ""),
            Err(PoolError::InvalidConfig { .. })
        ));
        assert!(matches!(
            SegmentPool::create(64, 4, "bad/name"),
            Err(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_fresh_pool_capacity() {
        let name = unique_name("pool_capacity");
        let _ = SegmentPool::unlink(&name);
        let pool = SegmentPool::create(128, 4, &name).unwrap();

        assert_eq!(pool.free_segments(), 4);

        let mut ids: Vec<usize> = (0..4)
            .map(|_| pool.get_free_segment().unwrap().id())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        // Exhausted pool reports unavailable, not an error
        assert!(pool.get_free_segment().is_none());
        assert_eq!(pool.free_segments(), 0);

        SegmentPool::unlink(&name).unwrap();
    }

    #[test]
    fn test_get_segment_by_id() {
        let name = unique_name("pool_by_id");
        let _ = SegmentPool::unlink(&name);
        let pool = SegmentPool::create(128, 2, &name).unwrap();

        // Lookup by id does not touch occupancy
        let handle = pool.get_segment(1).unwrap();
        assert_eq!(handle.id(), 1);
        assert!(!handle.is_occupied());
        assert_eq!(pool.free_segments(), 2);

        assert!(matches!(
            pool.get_segment(2),
            Err(PoolError::InvalidId { id: 2, num_segments: 2 })
        ));

        SegmentPool::unlink(&name).unwrap();
    }

    #[test]
    fn test_attach_shares_occupancy() {
        let name = unique_name("pool_shared_state");
        let _ = SegmentPool::unlink(&name);

        let creator = SegmentPool::create(64, 2, &name).unwrap();
        let claimed = creator.get_free_segment().unwrap();

        // A second attachment trusts the existing table
        let attached = SegmentPool::create(64, 2, &name).unwrap();
        assert!(!attached.created_region());
        assert_eq!(attached.free_segments(), 1);
        assert_eq!(attached.get_free_segment().unwrap().id(), 1);

        // Release through the attached view is visible to the creator
        attached.get_segment(claimed.id()).unwrap().release().unwrap();
        assert_eq!(creator.free_segments(), 1);

        SegmentPool::unlink(&name).unwrap();
    }

    #[test]
    fn test_reset_recovers_stranded_slots() {
        let name = unique_name("pool_reset");
        let _ = SegmentPool::unlink(&name);
        let pool = SegmentPool::create(64, 3, &name).unwrap();

        while pool.get_free_segment().is_some() {}
        assert_eq!(pool.free_segments(), 0);

        pool.reset();
        assert_eq!(pool.free_segments(), 3);

        SegmentPool::unlink(&name).unwrap();
    }
}
