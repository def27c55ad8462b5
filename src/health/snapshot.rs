//! # Point-in-time health snapshots and trend analysis.
//!
//! [`HealthSnapshot`] is an immutable record of process vitals; a bounded
//! ring ([`SnapshotRing`]) of recent snapshots feeds the memory-trend
//! classifier.
//!
//! ## Memory-leak heuristic
//! The classifier is a **heuristic, not proof**: it flags sustained resident
//! growth, which can also be caused by legitimate warm-up, cache fill, or
//! fragmentation. Thresholds are configurable precisely because the exact
//! constants are not load-bearing:
//! - the trailing window is classified *increasing* when the fraction of
//!   consecutive growing samples reaches `growth_ratio` (default 0.8);
//! - a leak is *suspected* when an increasing window also grew by more than
//!   `leak_pct` (default 0.15) relative to its first sample.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Process memory usage at a point in time.
///
/// Resident set size is the observable proxy for heap growth here; virtual
/// size is recorded for context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Resident set size in bytes.
    pub rss_bytes: u64,
    /// Virtual memory size in bytes.
    pub virt_bytes: u64,
}

/// Immutable point-in-time record of process vitals.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthSnapshot {
    /// Wall-clock timestamp of the sample.
    pub at: SystemTime,
    /// Memory usage.
    pub memory: MemoryStats,
    /// 1-minute load average, when the platform exposes one.
    pub cpu_load: Option<f64>,
    /// Observed scheduler lag in milliseconds (timer drift).
    pub scheduler_lag_ms: u64,
    /// Process uptime in milliseconds.
    pub uptime_ms: u64,
}

/// Classification of the recent memory trend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoryTrend {
    /// Not enough samples, or no sustained growth.
    Stable,
    /// Most consecutive samples grew, but below the leak threshold.
    Increasing {
        /// Relative growth over the window (e.g. `0.08` = 8%).
        growth: f64,
    },
    /// Sustained growth past the leak threshold. Advisory finding.
    LeakSuspected {
        /// Relative growth over the window.
        growth: f64,
    },
}

/// Bounded ring buffer of snapshots; oldest entries are evicted on overflow.
#[derive(Debug)]
pub struct SnapshotRing {
    buf: VecDeque<HealthSnapshot>,
    capacity: usize,
}

impl SnapshotRing {
    /// Creates a ring retaining at most `capacity` snapshots (minimum 2).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a snapshot, evicting the oldest when full.
    pub fn push(&mut self, snapshot: HealthSnapshot) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(snapshot);
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` when no snapshots are retained.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The most recent snapshot, if any.
    pub fn last(&self) -> Option<&HealthSnapshot> {
        self.buf.back()
    }

    /// Classifies the memory trend over the trailing `window` samples.
    ///
    /// Returns [`MemoryTrend::Stable`] until `window` samples exist. See the
    /// module docs for the heuristic's caveats.
    pub fn memory_trend(&self, window: usize, growth_ratio: f64, leak_pct: f64) -> MemoryTrend {
        let window = window.max(2);
        if self.buf.len() < window {
            return MemoryTrend::Stable;
        }

        let tail: Vec<u64> = self
            .buf
            .iter()
            .skip(self.buf.len() - window)
            .map(|s| s.memory.rss_bytes)
            .collect();

        let growing = tail.windows(2).filter(|w| w[1] > w[0]).count();
        let ratio = growing as f64 / (window - 1) as f64;
        if ratio < growth_ratio {
            return MemoryTrend::Stable;
        }

        let first = tail[0];
        if first == 0 {
            return MemoryTrend::Stable;
        }
        let last = tail[window - 1];
        let growth = (last as f64 - first as f64) / first as f64;

        if growth >= leak_pct {
            MemoryTrend::LeakSuspected { growth }
        } else {
            MemoryTrend::Increasing { growth }
        }
    }
}
