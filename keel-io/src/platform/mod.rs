pub mod affinity;
pub mod timer;
pub mod topology;

/// Locks the pages currently mapped by the process into physical RAM.
///
/// Real-time audio cannot afford a page fault inside the device callback, so
/// applications that care call this once after bring-up. Only current pages
/// are locked; `MCL_FUTURE` would make every later allocation count against
/// `ulimit -l` and fail early on small machines.
///
/// Returns `false` (after logging) if the OS refuses.
#[cfg(unix)]
pub fn lock_memory_pages() -> bool {
    // SAFETY: FFI call to mlockall with valid flags.
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT) };

    if ret != 0 {
        let err = std::io::Error::last_os_error();
        log::warn!("Failed to lock memory pages (mlockall): {}", err);
        log::warn!("Raise 'ulimit -l' or grant CAP_IPC_LOCK; continuing unpinned.");
        return false;
    }
    true
}

#[cfg(not(unix))]
pub fn lock_memory_pages() -> bool {
    log::warn!("Memory page locking is not available on this target");
    false
}
