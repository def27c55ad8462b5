//! # corevisor
//!
//! **Corevisor** is a process supervision and resilience framework for Rust.
//!
//! It manages the lifecycle, health, inter-dependency, and graceful
//! degradation of named sub-components ("features") inside one long-running
//! process. The crate is designed as the resilient core an application
//! registers its functionality into; the framework never inspects what a
//! feature actually does.
//!
//! ## Architecture
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ FeatureSpec  │   │ FeatureSpec  │   │ FeatureSpec  │
//!     │ (your db)    │   │ (your cache) │   │ (your api)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  CoreContext (explicit wiring object, one per process)            │
//! │  - FeatureManager (dependency order, init/start/stop walks)       │
//! │  - ServiceRegistry (discovery, capability links, pub/sub, state)  │
//! │  - HealthMonitor (heartbeat, probes, freeze/leak/CPU checks)      │
//! │  - ErrorReporter (fault taxonomy, retries, breaker updates)       │
//! │  - CircuitBreakerRegistry (per-service fail-fast isolation)       │
//! │  - ShutdownCoordinator (signals, drain, prioritized hooks)        │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                  SubscriberSet (per-sub queues, workers)
//!                        sub.on_event(&Event) each
//! ```
//!
//! ## Lifecycle
//! ```text
//! register(FeatureSpec) ... ──► initialize_all() ──► start_all()
//!   - dependency order resolved by iterative DFS (cycles detected)
//!   - critical feature failure aborts; non-critical degrades
//!   - instances auto-registered and capability-linked
//!
//! runtime:
//!   - HealthMonitor loops: heartbeat / sweep / freeze detection
//!   - ErrorReporter::handle() classifies faults, drives breakers
//!   - unhealthy findings escalate under a bounded restart budget
//!
//! shutdown (signal or fatal fault):
//!   - drain new work ──► wait for tracked operations (grace-bounded)
//!   - hooks in descending priority, each exactly once
//!   - exit with a distinct code, or reset in continuous mode
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use corevisor::{Config, ContextBuilder, Feature, FeatureError, FeatureSpec};
//!
//! struct Db;
//!
//! #[async_trait]
//! impl Feature for Db {
//!     fn name(&self) -> &str { "db" }
//!
//!     async fn start(&self) -> Result<(), FeatureError> {
//!         // connect...
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ContextBuilder::new(Config::default()).build();
//!
//!     ctx.features()
//!         .register(FeatureSpec::new("db", || Arc::new(Db)).critical(true).provides("sql"))
//!         .await;
//!
//!     ctx.start().await?;
//!     assert!(ctx.features().system_health().await.healthy);
//!
//!     // In a real binary this drives signal-based shutdown:
//!     // std::process::exit(ctx.run().await);
//!     ctx.coordinator().shutdown("example done").await;
//!     Ok(())
//! }
//! ```

mod breakers;
mod config;
mod context;
mod error;
mod events;
mod features;
mod health;
mod linker;
mod policies;
mod report;
mod shutdown;
mod subscribers;

// ---- Public re-exports ----

pub use breakers::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use config::{BreakerConfig, Config, HealthConfig, ShutdownConfig};
pub use context::{ContextBuilder, CoreContext};
pub use error::{FeatureError, FrameworkError, ProbeError};
pub use events::{Bus, Event, EventKind};
pub use features::{
    Feature, FeatureFactory, FeatureManager, FeatureRef, FeatureSpec, FeatureStatus,
    HealthSummary, SystemHealth,
};
pub use health::{
    HealthMonitor, HealthProbe, HealthSnapshot, MemoryStats, MemoryTrend, ProbeFn, ProbeRef,
    ProbeStatus, SnapshotRing,
};
pub use linker::{Connection, EventHandler, ServiceMetadata, ServiceRegistry, TopicBus};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use report::{ErrorReporter, FaultContext, FaultKind, GuardError, RetryOptions, Severity};
pub use shutdown::{
    EXIT_CLEAN, EXIT_DEADLOCK, EXIT_FATAL, EXIT_FREEZE, EXIT_SHUTDOWN_ERROR, ExitOutcome,
    OperationGuard, ShutdownCoordinator, ShutdownPhase, TermSignal, TrackedOperation,
    wait_for_shutdown_signal,
};

pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the built-in tracing-backed event log subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
