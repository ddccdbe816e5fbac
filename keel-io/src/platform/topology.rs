use log::{info, warn};

const FALLBACK_CACHE_LINE: usize = 64;
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Hardware Topology Detector.
/// Answers the hardware questions the platform layer asks: how many cores,
/// how big a page and a cache line are, and how much RAM is left.
#[derive(Clone, Debug)]
pub struct SystemTopology {
    core_count: usize,
    page_size: usize,
    cache_line_size: usize,
    processor_name: String,
    total_ram: u64,
    available_ram: u64,
}

impl SystemTopology {
    /// Detects the system's core and memory configuration.
    pub fn new() -> Self {
        let core_count = detect_core_count();
        let page_size = crate::memory::page_size();
        let cache_line_size = detect_cache_line_size();
        let processor_name = detect_processor_name();
        let (total_ram, available_ram) = detect_ram(page_size);

        info!(
            "Topology Discovery: {} cores, {} B pages, {} B cache lines, {:.2} GB RAM total ({:.2} GB available).",
            core_count,
            page_size,
            cache_line_size,
            total_ram as f64 / 1e9,
            available_ram as f64 / 1e9
        );

        Self { core_count, page_size, cache_line_size, processor_name, total_ram, available_ram }
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cache_line_size(&self) -> usize {
        self.cache_line_size
    }

    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    pub fn total_ram(&self) -> u64 {
        self.total_ram
    }

    /// Returns the available RAM in bytes (0 when the OS does not say).
    pub fn available_ram(&self) -> u64 {
        self.available_ram
    }

    /// Fewer than 4 cores or under 2 GB free: pick small audio buffers and
    /// a small arena.
    pub fn is_constrained(&self) -> bool {
        self.core_count < 4 || (self.available_ram > 0 && self.available_ram < 2_000_000_000)
    }
}

impl Default for SystemTopology {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_core_count() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(err) => {
            let ids = crate::platform::affinity::available_cores();
            if ids.is_empty() {
                warn!("Failed to detect core count ({}). Fallback to 1.", err);
                1
            } else {
                ids.len()
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn detect_cache_line_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let line = unsafe { libc::sysconf(libc::_SC_LEVEL1_DCACHE_LINESIZE) };
    if line > 0 {
        line as usize
    } else {
        FALLBACK_CACHE_LINE
    }
}

#[cfg(not(target_os = "linux"))]
fn detect_cache_line_size() -> usize {
    FALLBACK_CACHE_LINE
}

#[cfg(target_os = "linux")]
fn detect_processor_name() -> String {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|info| {
            info.lines()
                .find(|line| line.starts_with("model name"))
                .and_then(|line| line.split(':').nth(1))
                .map(|name| name.trim().to_string())
        })
        .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

#[cfg(not(target_os = "linux"))]
fn detect_processor_name() -> String {
    std::env::consts::ARCH.to_string()
}

#[cfg(target_os = "linux")]
fn detect_ram(page_size: usize) -> (u64, u64) {
    // SAFETY: sysconf has no memory-safety preconditions.
    let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let av_pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
    let page = page_size as u64;
    (total_pages.max(0) as u64 * page, av_pages.max(0) as u64 * page)
}

#[cfg(not(target_os = "linux"))]
fn detect_ram(_page_size: usize) -> (u64, u64) {
    (0, 0)
}

pub(crate) fn fallback_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_reports_sane_values() {
        let topo = SystemTopology::new();
        assert!(topo.core_count() >= 1);
        assert!(topo.page_size().is_power_of_two());
        assert!(topo.cache_line_size().is_power_of_two());
        assert!(!topo.processor_name().is_empty());
    }
}
