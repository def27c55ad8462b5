//! # CoreContext: one explicit wiring object per process.
//!
//! [`CoreContext`] owns every framework component, built once at process
//! start and passed (or cloned via `Arc`) wherever needed — no hidden
//! global state, and tests get a fresh context each.
//!
//! ## Wiring order
//! ```text
//! ContextBuilder::build()
//!   ├─► Bus                       (shared event channel)
//!   ├─► SubscriberSet + listener  (fan-out of bus events)
//!   ├─► CircuitBreakerRegistry
//!   ├─► ErrorReporter             (→ breakers)
//!   ├─► ServiceRegistry
//!   ├─► FeatureManager            (→ registry, reporter)
//!   ├─► HealthMonitor             (→ reporter)
//!   └─► ShutdownCoordinator
//!
//! CoreContext::start()
//!   ├─► hook "feature-manager" (critical): stop_all()
//!   ├─► hook "health-monitor": stop monitoring
//!   ├─► restart listener: RestartRequested{feature} → restart_feature()
//!   ├─► initialize_all() + start_all()
//!   └─► HealthMonitor::start()
//!
//! CoreContext::run()
//!   └─► ShutdownCoordinator::run() — resolves to the process exit code
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::breakers::CircuitBreakerRegistry;
use crate::config::Config;
use crate::error::FrameworkError;
use crate::events::{Bus, EventKind};
use crate::features::FeatureManager;
use crate::health::HealthMonitor;
use crate::linker::ServiceRegistry;
use crate::report::ErrorReporter;
use crate::shutdown::ShutdownCoordinator;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`CoreContext`].
///
/// Must run inside a tokio runtime: building spawns the subscriber
/// workers and the bus listener.
pub struct ContextBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    panic_hook: bool,
}

impl ContextBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            panic_hook: false,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive framework events (feature lifecycle, health
    /// findings, breaker flips, shutdown progress) through dedicated
    /// workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Installs the process-wide panic hook during
    /// [`CoreContext::start`], routing panics into the fatal-fault path.
    ///
    /// Off by default: the hook is process-global state.
    pub fn with_panic_hook(mut self) -> Self {
        self.panic_hook = true;
        self
    }

    /// Builds and returns the context.
    pub fn build(self) -> Arc<CoreContext> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        subscriber_listener(&bus, &subs);

        let breakers = Arc::new(CircuitBreakerRegistry::new(
            self.cfg.breaker.clone(),
            bus.clone(),
        ));
        let reporter = Arc::new(ErrorReporter::new(bus.clone(), Arc::clone(&breakers)));
        let services = Arc::new(ServiceRegistry::new(bus.clone()));
        let features = Arc::new(FeatureManager::new(
            bus.clone(),
            Arc::clone(&reporter),
            Arc::clone(&services),
        ));
        let health = Arc::new(HealthMonitor::new(
            self.cfg.health.clone(),
            bus.clone(),
            Arc::clone(&reporter),
        ));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            self.cfg.shutdown.clone(),
            bus.clone(),
        ));

        Arc::new(CoreContext {
            bus,
            subs,
            breakers,
            reporter,
            services,
            features,
            health,
            coordinator,
            panic_hook: self.panic_hook,
            started: AtomicBool::new(false),
        })
    }
}

/// Forwards bus events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, subs: &Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    let set = Arc::clone(subs);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// The framework's component graph, built once per process.
pub struct CoreContext {
    bus: Bus,
    #[allow(dead_code)]
    subs: Arc<SubscriberSet>,
    breakers: Arc<CircuitBreakerRegistry>,
    reporter: Arc<ErrorReporter>,
    services: Arc<ServiceRegistry>,
    features: Arc<FeatureManager>,
    health: Arc<HealthMonitor>,
    coordinator: Arc<ShutdownCoordinator>,
    panic_hook: bool,
    started: AtomicBool,
}

impl CoreContext {
    /// Starts the framework: registers the standard shutdown hooks, wires
    /// the restart listener, walks initialize/start, and begins health
    /// monitoring.
    ///
    /// Idempotent: a second call is a warning no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), FrameworkError> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("context already started");
            return Ok(());
        }

        if self.panic_hook {
            self.reporter.install_panic_hook();
        }

        // Stopping features is the critical hook: it must run even during
        // forced shutdown.
        let features = Arc::clone(&self.features);
        self.coordinator
            .register_hook("feature-manager", 100, move || {
                let features = Arc::clone(&features);
                async move {
                    features.stop_all().await;
                    Ok(())
                }
            })
            .await;

        let health = Arc::clone(&self.health);
        self.coordinator
            .register_hook("health-monitor", 90, move || {
                let health = Arc::clone(&health);
                async move {
                    health.stop();
                    Ok(())
                }
            })
            .await;

        self.spawn_restart_listener();

        self.features.initialize_all().await?;
        self.features.start_all().await?;
        self.health.start();
        Ok(())
    }

    /// Drives shutdown coordination until a sequence terminates the
    /// process; resolves to the exit code for the host to pass to the OS.
    ///
    /// ```no_run
    /// # async fn demo() {
    /// use corevisor::{Config, ContextBuilder};
    ///
    /// let ctx = ContextBuilder::new(Config::from_env()).build();
    /// ctx.start().await.expect("startup failed");
    /// std::process::exit(ctx.run().await);
    /// # }
    /// ```
    pub async fn run(&self) -> i32 {
        self.coordinator.run().await
    }

    /// Applies granted feature-restart requests from the health monitor.
    fn spawn_restart_listener(self: &Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let features = Arc::clone(&self.features);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) if ev.kind == EventKind::RestartRequested => {
                        let Some(feature) = ev.feature.as_deref() else {
                            continue;
                        };
                        if let Err(err) = features.restart_feature(feature).await {
                            tracing::error!(feature, error = %err, "requested restart failed");
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Circuit breaker registry.
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Error reporter.
    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    /// Service registry (discovery, wiring, pub/sub, shared state).
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Feature manager.
    pub fn features(&self) -> &Arc<FeatureManager> {
        &self.features
    }

    /// Health monitor.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Shutdown coordinator.
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeatureError;
    use crate::events::Event;
    use crate::features::{Feature, FeatureSpec};
    use crate::shutdown::ShutdownPhase;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Worker {
        journal: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Feature for Worker {
        fn name(&self) -> &str {
            "worker"
        }

        async fn start(&self) -> Result<(), FeatureError> {
            self.journal.lock().unwrap().push("start");
            Ok(())
        }

        async fn stop(&self) -> Result<(), FeatureError> {
            self.journal.lock().unwrap().push("stop");
            Ok(())
        }
    }

    async fn context() -> (Arc<CoreContext>, Arc<Mutex<Vec<&'static str>>>) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let ctx = ContextBuilder::new(Config::default()).build();
        let journal_in_factory = Arc::clone(&journal);
        ctx.features()
            .register(FeatureSpec::new("worker", move || {
                Arc::new(Worker {
                    journal: Arc::clone(&journal_in_factory),
                })
            }))
            .await;
        (ctx, journal)
    }

    #[tokio::test]
    async fn test_start_walks_lifecycle_and_shutdown_stops_features() {
        let (ctx, journal) = context().await;
        ctx.start().await.unwrap();
        assert!(ctx.features().status("worker").await.unwrap().running);

        let outcome = ctx.coordinator().shutdown("test").await;
        assert_eq!(outcome, crate::shutdown::ExitOutcome::Exit(0));
        assert_eq!(*journal.lock().unwrap(), vec!["start", "stop"]);
        assert_eq!(ctx.coordinator().phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_restart_listener_applies_granted_requests() {
        let (ctx, journal) = context().await;
        ctx.start().await.unwrap();
        journal.lock().unwrap().clear();

        assert!(
            ctx.health()
                .request_feature_restart("worker", "probe unhealthy")
                .await
        );

        // The listener runs asynchronously; give it a moment.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if journal.lock().unwrap().len() == 2 {
                break;
            }
        }
        assert_eq!(*journal.lock().unwrap(), vec!["stop", "start"]);
    }

    #[tokio::test]
    async fn test_fatal_fault_runs_critical_hooks_before_exit() {
        let (ctx, journal) = context().await;
        ctx.start().await.unwrap();
        journal.lock().unwrap().clear();

        let ctx_in_task = Arc::clone(&ctx);
        let running = tokio::spawn(async move { ctx_in_task.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        ctx.bus()
            .publish(Event::new(EventKind::FatalFault).with_reason("freeze: stale heartbeat"));

        let code = running.await.unwrap();
        assert_eq!(code, crate::shutdown::EXIT_FREEZE);
        // The critical feature-manager hook ran; features stopped.
        assert_eq!(*journal.lock().unwrap(), vec!["stop"]);
    }
}
