//! # Per-feature status and aggregate system health.
//!
//! These types serialize to JSON so hosts can expose them on whatever
//! operator surface they run (status endpoint, CLI dump, log record).

use serde::Serialize;
use std::time::SystemTime;

/// Lifecycle status tracked per feature, separately from its spec.
///
/// Invariant: `running` implies `initialized`.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    /// Whether `initialize` completed successfully.
    pub initialized: bool,
    /// Whether the feature is currently running.
    pub running: bool,
    /// Whether the feature is considered healthy. Starts `true`; a failed
    /// lifecycle call flips it until a successful start.
    pub healthy: bool,
    /// The last lifecycle error, if any.
    pub error: Option<String>,
    /// When the feature last started.
    pub started_at: Option<SystemTime>,
}

impl FeatureStatus {
    pub(crate) fn new() -> Self {
        Self {
            initialized: false,
            running: false,
            healthy: true,
            error: None,
            started_at: None,
        }
    }

    pub(crate) fn record_failure(&mut self, error: impl Into<String>) {
        self.healthy = false;
        self.error = Some(error.into());
    }

    pub(crate) fn record_started(&mut self) {
        self.running = true;
        self.healthy = true;
        self.error = None;
        self.started_at = Some(SystemTime::now());
    }
}

/// Counts aggregated over all registered features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    /// Registered features.
    pub total: usize,
    /// Enabled features.
    pub enabled: usize,
    /// Currently running features.
    pub running: usize,
    /// Enabled features considered healthy.
    pub healthy: usize,
    /// Enabled features considered unhealthy.
    pub unhealthy: usize,
}

/// Aggregate system health as seen by the feature manager.
///
/// `healthy` is `false` only when an **enabled critical** feature is
/// unhealthy; disabled features are deliberately off and never count
/// against the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemHealth {
    /// Overall verdict.
    pub healthy: bool,
    /// Per-category counts.
    pub summary: HealthSummary,
}
