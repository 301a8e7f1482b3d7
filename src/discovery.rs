//! Pool discovery and metadata sidecar files
//!
//! Every created pool gets a JSON `.meta` file next to its backing file
//! so operators and late-joining processes can enumerate pools without
//! mapping them. Metadata is written once at creation and removed by
//! `unlink`; it is diagnostic only and never consulted for correctness.

use crate::error::PoolResult;
use crate::platform::{SHM_DIR, is_process_alive};
use crate::region::{FILE_PREFIX, Region, region_path};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::debug;

/// Pool metadata as recorded at creation time
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PoolInfo {
    /// Pool name
    pub name: String,
    /// Bytes per segment
    pub segment_size: usize,
    /// Number of segments
    pub num_segments: usize,
    /// Creating process ID
    pub creator_pid: u32,
    /// Creation timestamp
    pub created_at: SystemTime,
}

impl PoolInfo {
    /// Whether the creating process is still running.
    ///
    /// A dead creator does not invalidate the pool (other processes may
    /// still hold it), but combined with stranded Occupied slots it is
    /// the signal an operator looks for.
    pub fn creator_alive(&self) -> bool {
        is_process_alive(self.creator_pid)
    }
}

/// Metadata sidecar path for a pool name
fn metadata_path(name: &str) -> String {
    format!("{}.meta", region_path(name))
}

/// Write the metadata sidecar for a freshly created region
pub(crate) fn write_pool_metadata(region: &Region) -> PoolResult<()> {
    let info = PoolInfo {
        name: region.name().to_string(),
        segment_size: region.segment_size(),
        num_segments: region.num_segments(),
        creator_pid: region.header().creator_pid,
        created_at: SystemTime::now(),
    };

    let json = serde_json::to_string_pretty(&info)?;
    std::fs::write(metadata_path(region.name()), json)?;
    debug!(name = region.name(), "wrote pool metadata");
    Ok(())
}

/// Remove the metadata sidecar, tolerating an absent file
pub(crate) fn remove_pool_metadata(name: &str) -> PoolResult<()> {
    match std::fs::remove_file(metadata_path(name)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Look up the metadata for one pool name, if recorded
pub fn find_pool(name: &str) -> PoolResult<Option<PoolInfo>> {
    match std::fs::read_to_string(metadata_path(name)) {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Enumerate all pools with a metadata sidecar under `/dev/shm`.
///
/// Entries with unreadable or malformed metadata are skipped rather than
/// failing the whole listing.
pub fn list_pools() -> PoolResult<Vec<PoolInfo>> {
    let mut pools = Vec::new();

    let shm_dir = std::path::Path::new(SHM_DIR);
    if !shm_dir.exists() {
        return Ok(pools);
    }

    for entry in std::fs::read_dir(shm_dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if !file_name.starts_with(FILE_PREFIX) || !file_name.ends_with(".meta") {
            continue;
        }
        if let Ok(json) = std::fs::read_to_string(entry.path()) {
            match serde_json::from_str::<PoolInfo>(&json) {
                Ok(info) => pools.push(info),
                Err(e) => debug!(file = %file_name, error = %e, "skipping malformed pool metadata"),
            }
        }
    }

    pools.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(pools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::pool::SegmentPool;

    #[test]
    fn test_metadata_round_trip() {
        let name = format!("discovery_round_trip_{}", std::process::id());
        let _ = SegmentPool::unlink(&name);
        let _pool = SegmentPool::create(256, 2, &name).unwrap();

        let info = find_pool(&name).unwrap().expect("metadata should exist");
        assert_eq!(info.name, name);
        assert_eq!(info.segment_size, 256);
        assert_eq!(info.num_segments, 2);
        assert_eq!(info.creator_pid, std::process::id());
        assert!(info.creator_alive());

        SegmentPool::unlink(&name).unwrap();
        assert!(find_pool(&name).unwrap().is_none());
    }

    #[test]
    fn test_list_pools_contains_created() {
        let name = format!("discovery_list_{}", std::process::id());
        let _ = SegmentPool::unlink(&name);
        let _pool = SegmentPool::create(128, 1, &name).unwrap();

        let pools = list_pools().unwrap();
        assert!(pools.iter().any(|p| p.name == name));

        SegmentPool::unlink(&name).unwrap();
    }

    #[test]
    fn test_find_missing_pool() {
        assert!(find_pool("discovery_never_created").unwrap().is_none());
    }

    #[test]
    fn test_attach_does_not_rewrite_metadata() {
        let name = format!("discovery_attach_{}", std::process::id());
        let _ = SegmentPool::unlink(&name);
        let _creator = SegmentPool::create(64, 1, &name).unwrap();
        let before = find_pool(&name).unwrap().unwrap();

        let _attached = SegmentPool::create(64, 1, &name).unwrap();
        let after = find_pool(&name).unwrap().unwrap();
        assert_eq!(before.created_at, after.created_at);

        SegmentPool::unlink(&name).unwrap();
    }

    #[test]
    fn test_error_is_json_variant_on_garbage() {
        let err = serde_json::from_str::<PoolInfo>("not json").unwrap_err();
        let err: PoolError = err.into();
        assert!(matches!(err, PoolError::Json { .. }));
    }
}
