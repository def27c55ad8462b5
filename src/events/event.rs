//! # Framework events emitted by the supervision components.
//!
//! The [`EventKind`] enum classifies event types across the framework:
//! - **Feature lifecycle**: registration, start/stop flow, failures;
//! - **Fault reporting**: classified errors, fatal escalation;
//! - **Circuit breakers**: state transitions per service;
//! - **Health**: state transitions, freeze/deadlock/leak/CPU findings,
//!   restart requests and budget exhaustion;
//! - **Shutdown**: signal receipt, drain completion, hook failures,
//!   continuous-mode restart cycles;
//! - **Shared state**: key changes in the service registry;
//! - **Subscriber plumbing**: overflow and panic isolation.
//!
//! The [`Event`] struct carries metadata such as timestamps, feature or
//! service names, reasons, and thresholds.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of framework events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `feature` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `feature` (subscriber name), `reason` (e.g. "full", "closed").
    SubscriberOverflow,

    // === Fault reporting ===
    /// A classified fault passed through the error reporter.
    ///
    /// Sets: `reason` (fault label + message), optionally `feature`/`service`.
    FaultReported,

    /// A fatal fault was reported; the shutdown coordinator reacts to this.
    ///
    /// Sets: `reason` (fault label + message).
    FatalFault,

    // === Circuit breakers ===
    /// A circuit transitioned to open after reaching the failure threshold.
    ///
    /// Sets: `service`, `attempt` (failure count).
    BreakerOpened,

    /// An open circuit cooled down and is accepting a trial call.
    ///
    /// Sets: `service`.
    BreakerHalfOpened,

    /// A half-open circuit observed a success and closed.
    ///
    /// Sets: `service`.
    BreakerClosed,

    // === Feature lifecycle ===
    /// A feature was registered (or re-registered, replacing metadata).
    ///
    /// Sets: `feature`.
    FeatureRegistered,

    /// A feature is about to start.
    ///
    /// Sets: `feature`.
    FeatureStarting,

    /// A feature started successfully.
    ///
    /// Sets: `feature`.
    FeatureStarted,

    /// A feature stopped (orderly, during shutdown or disable).
    ///
    /// Sets: `feature`.
    FeatureStopped,

    /// A feature's initialize/start/stop call failed.
    ///
    /// Sets: `feature`, `reason`.
    FeatureFailed,

    /// A feature was disabled (directly or by cascade).
    ///
    /// Sets: `feature`, `reason` ("requested" or the cascade origin).
    FeatureDisabled,

    // === Health ===
    /// Aggregate health flipped between healthy and unhealthy.
    ///
    /// Sets: `reason` ("healthy" / "unhealthy").
    HealthChanged,

    /// A registered probe failed or timed out.
    ///
    /// Sets: `feature` (probe name), `reason`.
    ProbeFailed,

    /// No heartbeat within the freeze threshold. Fires once per episode.
    ///
    /// Sets: `timeout_ms` (threshold).
    FreezeDetected,

    /// More than half of all probes are unhealthy simultaneously.
    ///
    /// Sets: `attempt` (unhealthy count), `reason`.
    DeadlockSuspected,

    /// Heap usage grew past the configured trend threshold. Advisory.
    ///
    /// Sets: `reason` (growth description).
    MemoryLeakSuspected,

    /// Smoothed load average breached the CPU threshold. Advisory.
    ///
    /// Sets: `reason` (load description).
    HighCpu,

    /// The health monitor requests a restart (of a feature, or of the
    /// process when `feature` is unset).
    ///
    /// Sets: optionally `feature`, `reason`, `attempt` (restart count).
    RestartRequested,

    /// The automatic restart budget is exhausted; operator intervention
    /// is required.
    ///
    /// Sets: `attempt` (budget).
    MaxRestartsReached,

    // === Shutdown ===
    /// Shutdown requested (OS signal observed or fatal escalation).
    ShutdownRequested,

    /// All tracked operations drained before the grace deadline.
    OperationsDrained,

    /// Grace period elapsed with operations still in flight.
    ///
    /// Sets: `reason` (outstanding descriptions).
    GraceExceeded,

    /// A shutdown hook returned an error (does not block later hooks).
    ///
    /// Sets: `feature` (hook name), `reason`.
    HookFailed,

    /// The shutdown sequence finished (hooks + cleanup).
    ShutdownComplete,

    /// Continuous mode: internal state was reset instead of exiting.
    ///
    /// Sets: `attempt` (cycle count).
    RestartCycle,

    // === Shared state ===
    /// A shared-state key changed.
    ///
    /// Sets: `key`.
    StateChanged,
}

/// Framework event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the feature (or probe/hook/subscriber), if applicable.
    pub feature: Option<Arc<str>>,
    /// Name of the external service (circuit breaker key), if applicable.
    pub service: Option<Arc<str>>,
    /// Shared-state key, for [`EventKind::StateChanged`].
    pub key: Option<Arc<str>>,
    /// Human-readable reason (errors, findings, overflow details).
    pub reason: Option<Arc<str>>,
    /// Attempt or count field (retries, restart cycles, failure counts).
    pub attempt: Option<u32>,
    /// Timeout or threshold in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            feature: None,
            service: None,
            key: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
        }
    }

    /// Attaches a feature (or probe/hook/subscriber) name.
    #[inline]
    pub fn with_feature(mut self, feature: impl Into<Arc<str>>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a shared-state key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt/count value.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout or threshold (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(duration_to_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_feature(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_feature(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[inline]
fn duration_to_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::FeatureStarting);
        let b = Event::new(EventKind::FeatureStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builder_fields() {
        let ev = Event::new(EventKind::FeatureFailed)
            .with_feature("payments")
            .with_reason("boom")
            .with_attempt(3)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(ev.kind, EventKind::FeatureFailed);
        assert_eq!(ev.feature.as_deref(), Some("payments"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert_eq!(ev.attempt, Some(3));
        assert_eq!(ev.timeout_ms, Some(5_000));
    }

    #[test]
    fn test_huge_duration_saturates() {
        let ev = Event::new(EventKind::FreezeDetected).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }
}
