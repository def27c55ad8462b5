//! # Registry of circuit breakers keyed by service name.
//!
//! [`CircuitBreakerRegistry`] owns the breaker table. Entries are created
//! lazily when the first failure for a service is recorded; reads for
//! unknown services report [`CircuitState::Closed`] without allocating.
//!
//! ## Rules
//! - All mutations go through the registry's methods; the table is never
//!   exposed for direct mutation.
//! - Reads and writes for a given service are linearizable: a single
//!   `RwLock` guards the table, so no update is lost under concurrent
//!   reporting from multiple features.
//! - State transitions publish `BreakerOpened` / `BreakerHalfOpened` /
//!   `BreakerClosed` to the bus.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::breakers::breaker::{CircuitBreaker, CircuitState};
use crate::config::BreakerConfig;
use crate::events::{Bus, Event, EventKind};

/// Per-service failure tracking with circuit-breaker semantics.
pub struct CircuitBreakerRegistry {
    cfg: BreakerConfig,
    bus: Bus,
    table: RwLock<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry.
    pub fn new(cfg: BreakerConfig, bus: Bus) -> Self {
        Self {
            cfg,
            bus,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Records a failure for `service`, creating its breaker lazily.
    ///
    /// Returns the state after the update.
    pub async fn record_failure(&self, service: &str) -> CircuitState {
        let mut table = self.table.write().await;
        let cb = table.entry(service.to_string()).or_default();

        if let Some(next) = cb.on_failure(self.cfg.failure_threshold, Instant::now()) {
            let failures = cb.failures;
            tracing::warn!(service, failures, "circuit opened");
            self.bus.publish(
                Event::new(EventKind::BreakerOpened)
                    .with_service(service)
                    .with_attempt(failures),
            );
            return next;
        }
        cb.state
    }

    /// Records a success for `service`.
    ///
    /// A success while half-open closes the circuit; in all states the
    /// consecutive-failure count resets. Unknown services are a no-op.
    pub async fn record_success(&self, service: &str) {
        let mut table = self.table.write().await;
        let Some(cb) = table.get_mut(service) else {
            return;
        };
        if cb.on_success() == Some(CircuitState::Closed) {
            tracing::info!(service, "circuit closed");
            self.bus
                .publish(Event::new(EventKind::BreakerClosed).with_service(service));
        }
    }

    /// Returns the current state for `service`, applying the lazy
    /// `Open → HalfOpen` transition when the cooldown has elapsed.
    pub async fn state(&self, service: &str) -> CircuitState {
        // Fast path: most reads observe no transition.
        {
            let table = self.table.read().await;
            match table.get(service) {
                None => return CircuitState::Closed,
                Some(cb) => {
                    let mut probe = cb.clone();
                    if probe.poll(self.cfg.cooldown, Instant::now()).is_none() {
                        return cb.state;
                    }
                }
            }
        }

        let mut table = self.table.write().await;
        let Some(cb) = table.get_mut(service) else {
            return CircuitState::Closed;
        };
        if cb.poll(self.cfg.cooldown, Instant::now()) == Some(CircuitState::HalfOpen) {
            tracing::info!(service, "circuit half-open, trial call allowed");
            self.bus
                .publish(Event::new(EventKind::BreakerHalfOpened).with_service(service));
        }
        cb.state
    }

    /// Returns `true` if callers must fail fast for `service`.
    pub async fn is_open(&self, service: &str) -> bool {
        self.state(service).await == CircuitState::Open
    }

    /// Returns a snapshot of all tracked services with their state and
    /// failure counts, sorted by service name.
    pub async fn snapshot(&self) -> Vec<(String, CircuitState, u32)> {
        let table = self.table.read().await;
        let mut entries: Vec<_> = table
            .iter()
            .map(|(name, cb)| (name.clone(), cb.state, cb.failures))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
