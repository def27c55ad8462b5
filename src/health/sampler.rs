//! # Process resource sampling.
//!
//! Reads memory usage and load average for the current process.
//!
//! ## Linux
//! [procfs](https://docs.kernel.org/filesystems/proc.html) is used:
//! `/proc/self/statm` for memory (lazily-updated, least accurate of the
//! procfs sources, but good enough for trend analysis) and `/proc/loadavg`
//! for the 1-minute load average.
//!
//! ## Other platforms
//! Sampling returns zeros/`None`; the memory-trend and CPU checks simply
//! stay quiet there.

use crate::health::snapshot::MemoryStats;

/// One resource sample.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    /// Memory usage of the current process.
    pub memory: MemoryStats,
    /// 1-minute load average, when available.
    pub load_avg_1m: Option<f64>,
}

/// Samples memory and load for the current process.
///
/// Never fails: unreadable sources yield zeros/`None`.
pub fn sample() -> ResourceSample {
    ResourceSample {
        memory: read_memory(),
        load_avg_1m: read_load_avg(),
    }
}

#[cfg(target_os = "linux")]
fn read_memory() -> MemoryStats {
    // statm reports pages: size resident shared text lib data dt.
    let raw = match std::fs::read_to_string("/proc/self/statm") {
        Ok(raw) => raw,
        Err(_) => return MemoryStats { rss_bytes: 0, virt_bytes: 0 },
    };
    let mut fields = raw.split_ascii_whitespace();
    let virt_pages: u64 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let rss_pages: u64 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);

    let page_size = page_size_bytes();
    MemoryStats {
        rss_bytes: rss_pages * page_size,
        virt_bytes: virt_pages * page_size,
    }
}

#[cfg(target_os = "linux")]
fn read_load_avg() -> Option<f64> {
    let raw = std::fs::read_to_string("/proc/loadavg").ok()?;
    raw.split_ascii_whitespace().next()?.parse().ok()
}

#[cfg(target_os = "linux")]
fn page_size_bytes() -> u64 {
    // 4 KiB pages are near-universal on the targets this runs on; statm
    // precision does not warrant a libc call here.
    4096
}

#[cfg(not(target_os = "linux"))]
fn read_memory() -> MemoryStats {
    MemoryStats {
        rss_bytes: 0,
        virt_bytes: 0,
    }
}

#[cfg(not(target_os = "linux"))]
fn read_load_avg() -> Option<f64> {
    None
}
