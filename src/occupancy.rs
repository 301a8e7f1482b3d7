//! Per-segment occupancy table shared by all attached processes
//!
//! One byte per segment inside the mapped region, driven exclusively by
//! compare-and-swap so that claims are atomic across process boundaries.
//! State machine per slot: `Free --(claim)--> Occupied --(release)--> Free`.

use crate::error::{PoolError, PoolResult};
use crate::region::Region;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Slot holds no live payload and may be claimed
pub const SLOT_FREE: u8 = 0;
/// Slot is claimed by exactly one process
pub const SLOT_OCCUPIED: u8 = 1;

/// View over the region's occupancy cells
pub struct OccupancyTable<'a> {
    region: &'a Region,
}

impl<'a> OccupancyTable<'a> {
    /// Table view for a mapped region
    pub fn new(region: &'a Region) -> Self {
        Self { region }
    }

    /// Atomically transition a slot Free -> Occupied.
    ///
    /// Returns `false` if the slot was not Free; the slot is untouched in
    /// that case.
    pub fn try_claim(&self, id: usize) -> PoolResult<bool> {
        self.check_id(id)?;
        let won = self
            .region
            .slot_cell(id)
            .compare_exchange(SLOT_FREE, SLOT_OCCUPIED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            debug!(id, "claimed segment");
        }
        Ok(won)
    }

    /// Transition a slot Occupied -> Free.
    ///
    /// Releasing an already-Free slot is a double-release bug in the
    /// caller and fails with `InvalidTransition`, leaving the slot Free.
    pub fn release(&self, id: usize) -> PoolResult<()> {
        self.check_id(id)?;
        match self.region.slot_cell(id).compare_exchange(
            SLOT_OCCUPIED,
            SLOT_FREE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                debug!(id, "released segment");
                Ok(())
            }
            Err(_) => {
                warn!(id, "release of a segment that was not occupied");
                Err(PoolError::InvalidTransition { id, state: "Free" })
            }
        }
    }

    /// Claim the lowest-indexed Free slot in a single scan-and-claim pass.
    ///
    /// Each Free candidate is taken with a compare-and-swap; if another
    /// process races ahead on a slot the scan moves to the next candidate.
    /// Returns `None` once the table is exhausted. Never blocks.
    pub fn claim_first_free(&self) -> Option<usize> {
        for (id, cell) in self.region.slot_cells().iter().enumerate() {
            if cell
                .compare_exchange(SLOT_FREE, SLOT_OCCUPIED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug!(id, "claimed segment");
                return Some(id);
            }
        }
        None
    }

    /// Whether a slot is currently Occupied
    pub fn is_occupied(&self, id: usize) -> PoolResult<bool> {
        self.check_id(id)?;
        Ok(self.region.slot_cell(id).load(Ordering::Acquire) != SLOT_FREE)
    }

    /// Number of Free slots at the instant of the scan
    pub fn free_slots(&self) -> usize {
        self.region
            .slot_cells()
            .iter()
            .filter(|cell| cell.load(Ordering::Acquire) == SLOT_FREE)
            .count()
    }

    /// Force every slot back to Free, regardless of current state.
    ///
    /// Administrative escape hatch for slots stranded by a crashed
    /// holder; concurrent well-behaved claimers will observe their slot
    /// flip under them, so this is only safe while the pool is quiesced.
    pub fn reset(&self) {
        for cell in self.region.slot_cells() {
            cell.store(SLOT_FREE, Ordering::Release);
        }
        warn!(name = self.region.name(), "occupancy table reset to all-Free");
    }

    fn check_id(&self, id: usize) -> PoolResult<()> {
        if id >= self.region.num_segments() {
            return Err(PoolError::InvalidId {
                id,
                num_segments: self.region.num_segments(),
            });
        }
        Ok(())
    }
}
