//! Named shared memory region backing the segment pool
//!
//! A region is a single `/dev/shm` file mapped by every participating
//! process. Fixed layout: [`RegionHeader`] (one cache line), then the
//! occupancy table (one byte per segment, padded to the next cache line),
//! then `num_segments * segment_size` payload bytes.

use crate::error::{PoolError, PoolResult};
use crate::platform::{SHM_DIR, backing_file_len, create_or_attach_mmap, get_current_pid};
use memmap2::MmapMut;
use std::sync::atomic::{AtomicU8, Ordering, fence};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Magic number identifying a segment pool region ("SHMPOOL1")
pub const POOL_MAGIC: u64 = 0x5348_4d50_4f4f_4c31;

/// Region layout version, bumped on incompatible header changes
pub const LAYOUT_VERSION: u32 = 1;

/// Alignment unit for the header and the occupancy table
pub const CACHE_LINE_SIZE: usize = 64;

/// Filename prefix for pool backing files under `/dev/shm`
pub const FILE_PREFIX: &str = "shm_pool_";

/// Region header with cache-line alignment, stamped once at creation
#[repr(C, align(64))]
pub struct RegionHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Layout version
    pub layout_version: u32,
    /// Creating process ID
    pub creator_pid: u32,
    /// Bytes per segment
    pub segment_size: u64,
    /// Number of segments
    pub num_segments: u64,
    /// Creation timestamp (nanoseconds since epoch)
    pub created_ts: u64,
    /// Padding to a full cache line
    _padding: [u8; 24],
}

/// Byte offsets and total size for a given pool geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    /// Offset of the occupancy table
    pub table_offset: usize,
    /// Offset of the first segment payload
    pub data_offset: usize,
    /// Total mapped size
    pub total_size: usize,
}

impl RegionLayout {
    /// Compute the layout for a pool geometry
    pub fn for_geometry(segment_size: usize, num_segments: usize) -> Self {
        let table_offset = std::mem::size_of::<RegionHeader>();
        let table_bytes = num_segments.div_ceil(CACHE_LINE_SIZE) * CACHE_LINE_SIZE;
        let data_offset = table_offset + table_bytes;
        Self {
            table_offset,
            data_offset,
            total_size: data_offset + num_segments * segment_size,
        }
    }
}

/// Backing file path for a pool name
pub fn region_path(name: &str) -> String {
    format!("{}/{}{}", SHM_DIR, FILE_PREFIX, name)
}

/// Mapped view of a named pool region
#[derive(Debug)]
pub struct Region {
    name: String,
    segment_size: usize,
    num_segments: usize,
    layout: RegionLayout,
    created: bool,
    base: *mut u8,
    // Held for the lifetime of `base`; all access goes through the pointer
    _mmap: MmapMut,
}

// The mapping is shared across processes by construction; within one
// process the occupancy table's atomics carry all synchronization.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Open the named region, creating and zero-initializing it if no
    /// process has referenced the name yet.
    ///
    /// Attaching validates the existing header: bad magic is
    /// `InvalidRegion`, geometry disagreement is `SizeMismatch`.
    pub fn open_or_create(
        name: &str,
        segment_size: usize,
        num_segments: usize,
    ) -> PoolResult<Self> {
        let layout = RegionLayout::for_geometry(segment_size, num_segments);
        let path = region_path(name);

        let existing_len = backing_file_len(&path).filter(|&len| len > 0);
        let mut mmap = create_or_attach_mmap(&path, layout.total_size)?;

        // The mapping length is the authority, not the pre-open stat: a
        // concurrent creator can win the name with different geometry
        // between the stat and the open, and every later pointer access
        // is bounded by what was actually mapped.
        if mmap.len() != layout.total_size {
            return Err(PoolError::SizeMismatch {
                name: name.to_string(),
                expected: layout.total_size,
                actual: mmap.len(),
            });
        }
        let base = mmap.as_mut_ptr();

        let created = match existing_len {
            None => {
                // Fresh file: contents are zero, so every slot starts Free
                let header = unsafe { &mut *(base as *mut RegionHeader) };
                *header = RegionHeader {
                    magic: POOL_MAGIC,
                    layout_version: LAYOUT_VERSION,
                    creator_pid: get_current_pid(),
                    segment_size: segment_size as u64,
                    num_segments: num_segments as u64,
                    created_ts: SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_nanos() as u64)
                        .unwrap_or(0),
                    _padding: [0; 24],
                };
                // Header must be visible before any other process trusts it
                fence(Ordering::Release);
                info!(
                    name,
                    segment_size, num_segments, total_size = layout.total_size,
                    "created shared memory region"
                );
                true
            }
            Some(_) => {
                let header = unsafe { &*(base as *const RegionHeader) };
                if header.magic != POOL_MAGIC || header.layout_version != LAYOUT_VERSION {
                    return Err(PoolError::InvalidRegion {
                        name: name.to_string(),
                    });
                }
                if header.segment_size != segment_size as u64
                    || header.num_segments != num_segments as u64
                {
                    let actual = RegionLayout::for_geometry(
                        header.segment_size as usize,
                        header.num_segments as usize,
                    )
                    .total_size;
                    return Err(PoolError::SizeMismatch {
                        name: name.to_string(),
                        expected: layout.total_size,
                        actual,
                    });
                }
                debug!(name, "attached to existing shared memory region");
                false
            }
        };

        Ok(Self {
            name: name.to_string(),
            segment_size,
            num_segments,
            layout,
            created,
            base,
            _mmap: mmap,
        })
    }

    /// Region header view
    pub fn header(&self) -> &RegionHeader {
        unsafe { &*(self.base as *const RegionHeader) }
    }

    /// Occupancy cell for a segment id, as a shared atomic
    pub(crate) fn slot_cell(&self, id: usize) -> &AtomicU8 {
        debug_assert!(id < self.num_segments);
        unsafe { &*(self.base.add(self.layout.table_offset + id) as *const AtomicU8) }
    }

    /// All occupancy cells as a slice of shared atomics
    pub(crate) fn slot_cells(&self) -> &[AtomicU8] {
        unsafe {
            std::slice::from_raw_parts(
                self.base.add(self.layout.table_offset) as *const AtomicU8,
                self.num_segments,
            )
        }
    }

    /// Base pointer of a segment's payload
    pub(crate) fn segment_ptr(&self, id: usize) -> *mut u8 {
        debug_assert!(id < self.num_segments);
        unsafe {
            self.base
                .add(self.layout.data_offset + id * self.segment_size)
        }
    }

    /// Region name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes per segment
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Number of segments
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Whether this process created the region (vs attached to it)
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Total mapped size in bytes
    pub fn total_size(&self) -> usize {
        self.layout.total_size
    }

    /// Remove the named region from the OS.
    ///
    /// Processes still holding a mapping keep it until they drop; no new
    /// process can attach afterwards. Dropping a `Region` only unmaps the
    /// local view, so this call is the designated teardown.
    pub fn unlink(name: &str) -> PoolResult<()> {
        match std::fs::remove_file(region_path(name)) {
            Ok(()) => {
                info!(name, "unlinked shared memory region");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_header_is_one_cache_line() {
        assert_eq!(std::mem::size_of::<RegionHeader>(), CACHE_LINE_SIZE);
        assert_eq!(std::mem::align_of::<RegionHeader>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn test_layout_offsets() {
        let layout = RegionLayout::for_geometry(4096, 4);
        assert_eq!(layout.table_offset, 64);
        // 4 slots pad out to one cache line
        assert_eq!(layout.data_offset, 128);
        assert_eq!(layout.total_size, 128 + 4 * 4096);

        // 65 slots need two cache lines of table
        let layout = RegionLayout::for_geometry(512, 65);
        assert_eq!(layout.data_offset, 64 + 128);
    }

    #[test]
    fn test_create_then_attach() {
        let name = unique_name("region_create_attach");
        let _ = Region::unlink(&name);
        let created = Region::open_or_create(&name, 1024, 3).unwrap();
        assert!(created.was_created());
        assert_eq!(created.header().magic, POOL_MAGIC);
        assert_eq!(created.header().num_segments, 3);

        let attached = Region::open_or_create(&name, 1024, 3).unwrap();
        assert!(!attached.was_created());
        assert_eq!(attached.header().creator_pid, std::process::id());

        Region::unlink(&name).unwrap();
    }

    #[test]
    fn test_attach_size_mismatch() {
        let name = unique_name("region_size_mismatch");
        let _ = Region::unlink(&name);
        let _created = Region::open_or_create(&name, 1024, 3).unwrap();

        let err = Region::open_or_create(&name, 2048, 3).unwrap_err();
        assert!(matches!(err, PoolError::SizeMismatch { .. }));

        Region::unlink(&name).unwrap();
    }

    #[test]
    fn test_mapped_length_disagreement_is_size_mismatch() {
        let name = unique_name("region_short_backing");
        let _ = Region::unlink(&name);
        // Backing file already present with the wrong length, as left by
        // a creator that won the name with different geometry
        std::fs::write(region_path(&name), vec![0u8; 100]).unwrap();

        let err = Region::open_or_create(&name, 1024, 3).unwrap_err();
        assert!(matches!(
            err,
            PoolError::SizeMismatch { actual: 100, .. }
        ));

        Region::unlink(&name).unwrap();
    }

    #[test]
    fn test_unlink_missing_is_ok() {
        assert!(Region::unlink("region_never_created_anywhere").is_ok());
    }
}
