use log::{info, warn};

/// Pins the current thread to a specific physical CPU core.
///
/// # Logic
/// On Linux this calls `sched_setaffinity` with a single bit set in the CPU
/// mask, which keeps the audio fill thread on one core and its ring cursors
/// hot in that core's cache. Other targets go through `core_affinity`.
///
/// # Errors
/// Logs a warning if pinning fails (e.g., core index out of bounds) and
/// returns `false`. It does NOT panic; the thread keeps running unpinned.
#[cfg(target_os = "linux")]
pub fn pin_thread_to_core(core_id: usize) -> bool {
    if core_id >= libc::CPU_SETSIZE as usize {
        warn!("Core {} is outside the CPU mask (running unpinned)", core_id);
        return false;
    }

    // SAFETY: cpu_set_t is plain data; zeroed is a valid empty mask.
    let mut cpu_set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::CPU_ZERO(&mut cpu_set);
        libc::CPU_SET(core_id, &mut cpu_set);
    }

    // SAFETY:
    // - pid 0 refers to the calling thread.
    // - `cpu_set` is stack-allocated and valid for the call.
    let ret = unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpu_set) };

    if ret != 0 {
        let err = std::io::Error::last_os_error();
        warn!("Failed to pin thread to core {}: {} (running unpinned)", core_id, err);
        return false;
    }

    info!("Thread pinned to core {}", core_id);
    true
}

#[cfg(not(target_os = "linux"))]
pub fn pin_thread_to_core(core_id: usize) -> bool {
    let pinned = core_affinity::set_for_current(core_affinity::CoreId { id: core_id });
    if pinned {
        info!("Thread pinned to core {}", core_id);
    } else {
        warn!("Failed to pin thread to core {} (running unpinned)", core_id);
    }
    pinned
}

/// Core ids the scheduler will accept for pinning.
pub fn available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .map(|ids| ids.into_iter().map(|c| c.id).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_core_is_not_fatal() {
        let pinned = std::thread::spawn(|| pin_thread_to_core(1023)).join().unwrap();
        assert!(!pinned);
    }
}
