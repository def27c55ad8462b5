//! # Central error intake: classify, log, publish, isolate.
//!
//! [`ErrorReporter`] is the single entry point for failures anywhere in the
//! process. Every [`handle`](ErrorReporter::handle) call:
//!
//! 1. writes a structured log record at a level matching the fault severity,
//! 2. publishes a `FaultReported` event for listeners,
//! 3. for [`FaultKind::Api`] with a named service in context, records the
//!    failure on that service's circuit breaker,
//! 4. for fatal kinds, additionally publishes `FatalFault` — the shutdown
//!    coordinator listens for it and funnels the process into
//!    `force_shutdown` so critical hooks still run before exit.
//!
//! Process-level faults (panics, dead background tasks) are routed here via
//! [`ErrorReporter::install_panic_hook`] and
//! [`ErrorReporter::report_join_error`].

use std::sync::Arc;

use tokio::task::JoinError;

use crate::breakers::CircuitBreakerRegistry;
use crate::events::{Bus, Event, EventKind};

/// Classification of reported faults.
///
/// Labels are stable and double as machine-readable keys (the shutdown
/// coordinator maps `freeze`/`deadlock` labels to distinct exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Unattributable crash surfaced by the process panic hook.
    UncaughtPanic,
    /// A detached background task panicked or was aborted.
    DetachedTaskFailure,
    /// A call to an external service failed; drives the circuit breaker.
    Api,
    /// A retried operation exhausted its backoff attempts.
    RetryExhausted,
    /// A feature failed to initialize.
    FeatureInit,
    /// A feature failed to start.
    FeatureStart,
    /// The feature dependency graph contains a cycle.
    CircularDependency,
    /// A feature references an unregistered dependency.
    MissingDependency,
    /// The heartbeat stopped updating past the freeze threshold.
    Freeze,
    /// A majority of health probes are unhealthy simultaneously.
    Deadlock,
    /// Heap growth matched the leak heuristic. Advisory only.
    MemoryLeak,
}

/// How a fault propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The process cannot continue; funnel into forced shutdown.
    Fatal,
    /// Degraded but recoverable; record and continue.
    Recoverable,
    /// Informational finding; no remediation is triggered.
    Advisory,
}

impl FaultKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FaultKind::UncaughtPanic => "uncaught_panic",
            FaultKind::DetachedTaskFailure => "detached_task_failure",
            FaultKind::Api => "api_error",
            FaultKind::RetryExhausted => "retry_exhausted",
            FaultKind::FeatureInit => "feature_init_error",
            FaultKind::FeatureStart => "feature_start_error",
            FaultKind::CircularDependency => "circular_dependency",
            FaultKind::MissingDependency => "missing_dependency",
            FaultKind::Freeze => "freeze",
            FaultKind::Deadlock => "deadlock",
            FaultKind::MemoryLeak => "memory_leak_suspected",
        }
    }

    /// Returns the propagation class of this fault kind.
    ///
    /// Freeze and deadlock are classified recoverable here: the health
    /// monitor owns their escalation (bounded restarts, then the fatal
    /// path), so reporting them must not short-circuit that budget.
    pub fn severity(&self) -> Severity {
        match self {
            FaultKind::UncaughtPanic
            | FaultKind::DetachedTaskFailure
            | FaultKind::CircularDependency
            | FaultKind::MissingDependency => Severity::Fatal,
            FaultKind::Api
            | FaultKind::RetryExhausted
            | FaultKind::FeatureInit
            | FaultKind::FeatureStart
            | FaultKind::Freeze
            | FaultKind::Deadlock => Severity::Recoverable,
            FaultKind::MemoryLeak => Severity::Advisory,
        }
    }
}

/// Optional attribution attached to a reported fault.
#[derive(Debug, Clone, Default)]
pub struct FaultContext {
    /// The feature the fault occurred in, if known.
    pub feature: Option<String>,
    /// The external service involved; for [`FaultKind::Api`] this selects
    /// the circuit breaker to update.
    pub service: Option<String>,
}

impl FaultContext {
    /// Empty context (no attribution).
    pub fn none() -> Self {
        Self::default()
    }

    /// Context attributing the fault to a feature.
    pub fn feature(name: impl Into<String>) -> Self {
        Self {
            feature: Some(name.into()),
            service: None,
        }
    }

    /// Context attributing the fault to an external service.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            feature: None,
            service: Some(name.into()),
        }
    }

    /// Adds a service to an existing context.
    pub fn with_service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }
}

/// Classifies and records failures, updating circuit breakers and
/// escalating fatal faults.
pub struct ErrorReporter {
    bus: Bus,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl ErrorReporter {
    /// Creates a reporter publishing to `bus` and updating `breakers`.
    pub fn new(bus: Bus, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { bus, breakers }
    }

    /// Reports a classified fault.
    ///
    /// Logging level follows [`FaultKind::severity`]; `Api` faults with a
    /// named service update that service's breaker; fatal kinds additionally
    /// publish `FatalFault`.
    pub async fn handle(&self, kind: FaultKind, error: &str, ctx: FaultContext) {
        let label = kind.as_label();
        let severity = kind.severity();

        match severity {
            Severity::Fatal => tracing::error!(
                fault = label,
                feature = ctx.feature.as_deref(),
                service = ctx.service.as_deref(),
                error,
                "fatal fault reported"
            ),
            Severity::Recoverable => tracing::warn!(
                fault = label,
                feature = ctx.feature.as_deref(),
                service = ctx.service.as_deref(),
                error,
                "fault reported"
            ),
            Severity::Advisory => tracing::info!(
                fault = label,
                feature = ctx.feature.as_deref(),
                service = ctx.service.as_deref(),
                error,
                "advisory fault reported"
            ),
        }

        let mut ev = Event::new(EventKind::FaultReported).with_reason(format!("{label}: {error}"));
        if let Some(feature) = &ctx.feature {
            ev = ev.with_feature(feature.as_str());
        }
        if let Some(service) = &ctx.service {
            ev = ev.with_service(service.as_str());
        }
        self.bus.publish(ev);

        if kind == FaultKind::Api {
            if let Some(service) = &ctx.service {
                self.breakers.record_failure(service).await;
            }
        }

        if severity == Severity::Fatal {
            self.bus.publish(
                Event::new(EventKind::FatalFault).with_reason(format!("{label}: {error}")),
            );
        }
    }

    /// Records a success against a service's circuit breaker.
    ///
    /// Call after a guarded operation succeeds so a half-open circuit can
    /// close.
    pub async fn record_success(&self, service: &str) {
        self.breakers.record_success(service).await;
    }

    /// Returns `true` if callers must fail fast for `service`.
    pub async fn is_open(&self, service: &str) -> bool {
        self.breakers.is_open(service).await
    }

    /// Reports a detached task's terminal failure (panic or abort).
    ///
    /// The Rust rendition of an unhandled async failure: hosts that detach
    /// background tasks pass the `JoinError` here so it reaches the same
    /// fatal path as a process panic.
    pub async fn report_join_error(&self, task: &str, err: &JoinError) {
        let detail = if err.is_panic() {
            format!("task {task:?} panicked")
        } else {
            format!("task {task:?} aborted")
        };
        self.handle(FaultKind::DetachedTaskFailure, &detail, FaultContext::none())
            .await;
    }

    /// Installs a process-wide panic hook that logs the panic and publishes
    /// `FatalFault`.
    ///
    /// The previous hook is preserved and invoked afterwards. Publishing
    /// from the hook is synchronous (broadcast send never blocks), so this
    /// is safe to call from non-async panic contexts.
    pub fn install_panic_hook(&self) {
        let bus = self.bus.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = info.to_string();
            tracing::error!(fault = "uncaught_panic", %message, "process panic");
            bus.publish(
                Event::new(EventKind::FatalFault)
                    .with_reason(format!("uncaught_panic: {message}")),
            );
            previous(info);
        }));
    }

    /// The bus this reporter publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The breaker registry this reporter updates.
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakers::CircuitState;
    use crate::config::BreakerConfig;
    use std::time::Duration;

    fn reporter() -> ErrorReporter {
        let bus = Bus::new(32);
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            BreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(60),
            },
            bus.clone(),
        ));
        ErrorReporter::new(bus, breakers)
    }

    #[tokio::test]
    async fn test_handle_publishes_fault_reported() {
        let rep = reporter();
        let mut rx = rep.bus().subscribe();

        rep.handle(
            FaultKind::FeatureStart,
            "boom",
            FaultContext::feature("cache"),
        )
        .await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::FaultReported);
        assert_eq!(ev.feature.as_deref(), Some("cache"));
        assert!(ev.reason.as_deref().unwrap().contains("feature_start_error"));
    }

    #[tokio::test]
    async fn test_api_fault_with_service_drives_breaker() {
        let rep = reporter();

        rep.handle(FaultKind::Api, "503", FaultContext::service("payments"))
            .await;
        assert_eq!(
            rep.breakers().state("payments").await,
            CircuitState::Closed
        );

        rep.handle(FaultKind::Api, "503", FaultContext::service("payments"))
            .await;
        assert!(rep.is_open("payments").await);
    }

    #[tokio::test]
    async fn test_api_fault_without_service_leaves_breakers_alone() {
        let rep = reporter();
        rep.handle(FaultKind::Api, "503", FaultContext::none()).await;
        assert!(rep.breakers().snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_kind_publishes_fatal_fault() {
        let rep = reporter();
        let mut rx = rep.bus().subscribe();

        rep.handle(FaultKind::UncaughtPanic, "at src/x.rs:1", FaultContext::none())
            .await;

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::FaultReported);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::FatalFault);
        assert!(ev.reason.as_deref().unwrap().starts_with("uncaught_panic"));
    }

    #[tokio::test]
    async fn test_advisory_kind_does_not_escalate() {
        let rep = reporter();
        let mut rx = rep.bus().subscribe();

        rep.handle(FaultKind::MemoryLeak, "heap +18%", FaultContext::none())
            .await;

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::FaultReported);
        assert!(rx.try_recv().is_err());
    }
}
