//! # LogWriter — structured event log
//!
//! A subscriber that renders every framework event as a `tracing` record.
//! This is the operator-facing append-only diagnosis log: health-state
//! transitions, restart-count exhaustion, breaker flips, and shutdown
//! progress all pass through here.

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event log subscriber backed by `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let feature = e.feature.as_deref();
        let service = e.service.as_deref();
        let reason = e.reason.as_deref();

        match e.kind {
            EventKind::FeatureRegistered => {
                tracing::debug!(seq = e.seq, feature, "feature registered");
            }
            EventKind::FeatureStarting => {
                tracing::debug!(seq = e.seq, feature, "feature starting");
            }
            EventKind::FeatureStarted => {
                tracing::info!(seq = e.seq, feature, "feature started");
            }
            EventKind::FeatureStopped => {
                tracing::info!(seq = e.seq, feature, "feature stopped");
            }
            EventKind::FeatureFailed => {
                tracing::warn!(seq = e.seq, feature, reason, "feature failed");
            }
            EventKind::FeatureDisabled => {
                tracing::info!(seq = e.seq, feature, reason, "feature disabled");
            }
            EventKind::FaultReported => {
                tracing::debug!(seq = e.seq, feature, service, reason, "fault recorded");
            }
            EventKind::FatalFault => {
                tracing::error!(seq = e.seq, reason, "fatal fault");
            }
            EventKind::BreakerOpened => {
                tracing::warn!(seq = e.seq, service, failures = e.attempt, "circuit opened");
            }
            EventKind::BreakerHalfOpened => {
                tracing::info!(seq = e.seq, service, "circuit half-open");
            }
            EventKind::BreakerClosed => {
                tracing::info!(seq = e.seq, service, "circuit closed");
            }
            EventKind::HealthChanged => {
                tracing::info!(seq = e.seq, state = reason, "health state changed");
            }
            EventKind::ProbeFailed => {
                tracing::warn!(seq = e.seq, probe = feature, reason, "health probe failed");
            }
            EventKind::FreezeDetected => {
                tracing::error!(seq = e.seq, threshold_ms = e.timeout_ms, "freeze detected");
            }
            EventKind::DeadlockSuspected => {
                tracing::error!(seq = e.seq, unhealthy = e.attempt, reason, "deadlock suspected");
            }
            EventKind::MemoryLeakSuspected => {
                tracing::warn!(seq = e.seq, reason, "memory leak suspected");
            }
            EventKind::HighCpu => {
                tracing::warn!(seq = e.seq, reason, "high cpu");
            }
            EventKind::RestartRequested => {
                tracing::warn!(seq = e.seq, feature, reason, restart = e.attempt, "restart requested");
            }
            EventKind::MaxRestartsReached => {
                tracing::error!(seq = e.seq, budget = e.attempt, "max restarts reached, operator intervention required");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(seq = e.seq, "shutdown requested");
            }
            EventKind::OperationsDrained => {
                tracing::info!(seq = e.seq, "in-flight operations drained");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(seq = e.seq, outstanding = reason, "grace period exceeded");
            }
            EventKind::HookFailed => {
                tracing::warn!(seq = e.seq, hook = feature, reason, "shutdown hook failed");
            }
            EventKind::ShutdownComplete => {
                tracing::info!(seq = e.seq, "shutdown complete");
            }
            EventKind::RestartCycle => {
                tracing::info!(seq = e.seq, cycle = e.attempt, "continuous mode: state reset");
            }
            EventKind::StateChanged => {
                tracing::debug!(seq = e.seq, key = e.key.as_deref(), "shared state changed");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(seq = e.seq, subscriber = feature, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(seq = e.seq, subscriber = feature, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
