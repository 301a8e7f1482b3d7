//! Linux-specific shared memory plumbing

use crate::error::PoolResult;
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

/// Directory holding POSIX shared memory objects
pub const SHM_DIR: &str = "/dev/shm";

/// Create or open the backing file and map it read/write.
///
/// The file is grown to `size` bytes on creation; an existing file is
/// mapped as-is (callers validate its length separately).
pub fn create_or_attach_mmap(path: &str, size: usize) -> PoolResult<MmapMut> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)?;

    let current_len = file.metadata()?.len();
    if current_len == 0 {
        file.set_len(size as u64)?;
    }

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Size of an existing backing file, or `None` if the name is unused.
pub fn backing_file_len(path: &str) -> Option<usize> {
    std::fs::metadata(path).ok().map(|m| m.len() as usize)
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Null signal probes for existence without delivering anything
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}
