//! Health monitoring: heartbeat/freeze detection, probes, resource trends.
//!
//! ## Contents
//! - [`HealthMonitor`] — the three periodic check loops and escalation
//! - [`HealthProbe`], [`ProbeFn`], [`ProbeRef`], [`ProbeStatus`] — probes
//! - [`HealthSnapshot`], [`MemoryStats`], [`MemoryTrend`], [`SnapshotRing`]
//!   — vitals and trend analysis
//!
//! Resource sampling (procfs-backed memory/load reads) is internal to the
//! sweep loop.
//!
//! ## Quick reference
//! Freeze, deadlock, and leak findings fire once per episode and are
//! heuristics: they flag conditions worth operator attention, they do not
//! prove root cause.

mod monitor;
mod probe;
mod sampler;
mod snapshot;

pub use monitor::HealthMonitor;
pub use probe::{HealthProbe, ProbeFn, ProbeRef, ProbeStatus};
pub use snapshot::{HealthSnapshot, MemoryStats, MemoryTrend, SnapshotRing};
