//! # HealthMonitor: heartbeat, probes, resource trends, escalation.
//!
//! Runs three independent periodic loops, each a cancellable
//! `tokio::select!` loop:
//!
//! ```text
//! heartbeat loop (short interval)
//!   └─► beat(): refresh the "I am alive" timestamp, re-arm freeze latch,
//!       record scheduler lag (timer drift)
//!
//! sweep loop (medium interval)
//!   └─► run_sweep():
//!         ├─► sample memory/load ─► push snapshot ─► memory trend
//!         ├─► run all probes, each raced against its timeout
//!         ├─► deadlock check (majority of probes unhealthy)
//!         ├─► CPU check (load average vs threshold)
//!         └─► aggregate health transition (HealthChanged)
//!
//! freeze loop (short interval)
//!   └─► check_freeze(): heartbeat age vs freeze threshold
//! ```
//!
//! ## Escalation
//! Freeze and deadlock findings are reported and, when auto-restart is
//! enabled, escalate under the bounded restart budget: a granted slot
//! publishes `FatalFault` (the coordinator exits with a distinct code, or
//! resets in continuous mode); an exhausted budget publishes
//! `MaxRestartsReached` once per window and stops escalating.
//!
//! ## Rules
//! - Findings fire **once per episode** (freeze/deadlock/leak latches),
//!   not on every check tick.
//! - Probe timeouts are failures, never successes, and never hang: every
//!   probe is raced against its own timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::HealthConfig;
use crate::error::ProbeError;
use crate::events::{Bus, Event, EventKind};
use crate::health::probe::{ProbeRef, ProbeStatus};
use crate::health::sampler;
use crate::health::snapshot::{HealthSnapshot, MemoryTrend, SnapshotRing};
use crate::report::{ErrorReporter, FaultContext, FaultKind};

/// A registered probe with its last observed status.
struct ProbeEntry {
    probe: ProbeRef,
    status: ProbeStatus,
}

/// Bounded budget for automatic restarts.
struct RestartBudget {
    window_start: Instant,
    count: u32,
    exhausted_reported: bool,
}

impl RestartBudget {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
            exhausted_reported: false,
        }
    }

    /// Grants a restart slot, rolling the window when it has elapsed.
    ///
    /// Returns `Some(count)` with the new in-window count, or `None` when
    /// the budget is exhausted (`exhausted_reported` dedupes the alert).
    fn grant(&mut self, max: u32, window: std::time::Duration) -> Option<u32> {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
            self.exhausted_reported = false;
        }
        if self.count >= max {
            return None;
        }
        self.count += 1;
        Some(self.count)
    }
}

/// Periodic self-checks for the hosting process.
pub struct HealthMonitor {
    cfg: HealthConfig,
    bus: Bus,
    reporter: Arc<ErrorReporter>,
    probes: RwLock<Vec<ProbeEntry>>,
    ring: Mutex<SnapshotRing>,
    restarts: Mutex<RestartBudget>,
    heartbeat_at: RwLock<Instant>,
    scheduler_lag_ms: AtomicU64,
    freeze_latched: AtomicBool,
    deadlock_latched: AtomicBool,
    leak_latched: AtomicBool,
    healthy: AtomicBool,
    started_at: Instant,
    token: CancellationToken,
}

impl HealthMonitor {
    /// Creates a monitor; no loops run until [`HealthMonitor::start`].
    pub fn new(cfg: HealthConfig, bus: Bus, reporter: Arc<ErrorReporter>) -> Self {
        let capacity = cfg.snapshot_capacity;
        Self {
            cfg,
            bus,
            reporter,
            probes: RwLock::new(Vec::new()),
            ring: Mutex::new(SnapshotRing::new(capacity)),
            restarts: Mutex::new(RestartBudget::new()),
            heartbeat_at: RwLock::new(Instant::now()),
            scheduler_lag_ms: AtomicU64::new(0),
            freeze_latched: AtomicBool::new(false),
            deadlock_latched: AtomicBool::new(false),
            leak_latched: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            started_at: Instant::now(),
            token: CancellationToken::new(),
        }
    }

    /// Registers a probe. Probes start healthy and run on the next sweep.
    pub async fn register_probe(&self, probe: ProbeRef) {
        let mut probes = self.probes.write().await;
        if let Some(existing) = probes.iter_mut().find(|e| e.probe.name() == probe.name()) {
            tracing::warn!(probe = probe.name(), "probe re-registered, replacing");
            existing.probe = probe;
            existing.status = ProbeStatus::new();
            return;
        }
        probes.push(ProbeEntry {
            probe,
            status: ProbeStatus::new(),
        });
    }

    /// Spawns the heartbeat, sweep, and freeze-detection loops.
    ///
    /// Call once; loops run until [`HealthMonitor::stop`].
    pub fn start(self: &Arc<Self>) {
        self.spawn_heartbeat_loop();
        self.spawn_sweep_loop();
        self.spawn_freeze_loop();
        tracing::info!(
            heartbeat_ms = self.cfg.heartbeat_interval.as_millis() as u64,
            check_ms = self.cfg.check_interval.as_millis() as u64,
            freeze_threshold_ms = self.cfg.freeze_threshold.as_millis() as u64,
            "health monitoring started"
        );
    }

    /// Cancels all monitoring loops.
    pub fn stop(&self) {
        self.token.cancel();
        tracing::info!("health monitoring stopped");
    }

    /// Records a heartbeat and re-arms the freeze latch.
    ///
    /// Called by the heartbeat loop; hosts may also beat manually from
    /// their own hot paths.
    pub async fn beat(&self) {
        *self.heartbeat_at.write().await = Instant::now();
        self.freeze_latched.store(false, Ordering::SeqCst);
    }

    /// Current aggregate health (heartbeat fresh, no deadlock, probes ok).
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// The most recent snapshot, if a sweep has run.
    pub async fn last_snapshot(&self) -> Option<HealthSnapshot> {
        self.ring.lock().await.last().copied()
    }

    /// Last observed status per registered probe.
    pub async fn probe_statuses(&self) -> Vec<(String, ProbeStatus)> {
        let probes = self.probes.read().await;
        probes
            .iter()
            .map(|e| (e.probe.name().to_string(), e.status.clone()))
            .collect()
    }

    /// Requests a bounded-budget restart of a feature.
    ///
    /// A granted slot publishes `RestartRequested` (the context's restart
    /// listener performs the actual stop/start); an exhausted budget
    /// publishes `MaxRestartsReached` once per window. Returns whether the
    /// request was granted.
    pub async fn request_feature_restart(&self, feature: &str, reason: &str) -> bool {
        let granted = {
            let mut budget = self.restarts.lock().await;
            match budget.grant(self.cfg.max_restarts, self.cfg.restart_window) {
                Some(count) => Some(count),
                None => {
                    if !budget.exhausted_reported {
                        budget.exhausted_reported = true;
                        self.bus.publish(
                            Event::new(EventKind::MaxRestartsReached)
                                .with_attempt(self.cfg.max_restarts),
                        );
                    }
                    None
                }
            }
        };

        match granted {
            Some(count) => {
                self.bus.publish(
                    Event::new(EventKind::RestartRequested)
                        .with_feature(feature)
                        .with_reason(reason.to_string())
                        .with_attempt(count),
                );
                true
            }
            None => {
                tracing::error!(feature, reason, "restart budget exhausted");
                false
            }
        }
    }

    // ---------------------------
    // Loops
    // ---------------------------

    fn spawn_heartbeat_loop(self: &Arc<Self>) {
        let me = Arc::clone(self);
        let token = self.token.clone();
        tokio::spawn(async move {
            let interval = me.cfg.heartbeat_interval;
            let mut last_tick = Instant::now();
            loop {
                let sleep = tokio::time::sleep(interval);
                tokio::pin!(sleep);
                tokio::select! {
                    _ = &mut sleep => {}
                    _ = token.cancelled() => break,
                }
                // Timer drift doubles as the scheduler-lag measure.
                let lag = last_tick.elapsed().saturating_sub(interval);
                last_tick = Instant::now();
                me.scheduler_lag_ms
                    .store(lag.as_millis() as u64, Ordering::Relaxed);
                me.beat().await;
            }
        });
    }

    fn spawn_sweep_loop(self: &Arc<Self>) {
        let me = Arc::clone(self);
        let token = self.token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(me.cfg.check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => me.run_sweep().await,
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    fn spawn_freeze_loop(self: &Arc<Self>) {
        let me = Arc::clone(self);
        let token = self.token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(me.cfg.freeze_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => me.check_freeze().await,
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    // ---------------------------
    // Checks
    // ---------------------------

    /// Compares heartbeat age against the freeze threshold.
    ///
    /// Fires once per episode: the latch is re-armed by the next heartbeat.
    pub async fn check_freeze(&self) {
        let age = self.heartbeat_at.read().await.elapsed();
        if age < self.cfg.freeze_threshold {
            return;
        }
        if self.freeze_latched.swap(true, Ordering::SeqCst) {
            return;
        }

        self.bus.publish(
            Event::new(EventKind::FreezeDetected).with_timeout(self.cfg.freeze_threshold),
        );
        let detail = format!("no heartbeat for {age:?}");
        self.reporter
            .handle(FaultKind::Freeze, &detail, FaultContext::none())
            .await;
        self.escalate("freeze", &detail).await;
    }

    /// Runs one health sweep: snapshot, trend, probes, deadlock, CPU.
    pub async fn run_sweep(&self) {
        let resources = sampler::sample();
        let snapshot = HealthSnapshot {
            at: SystemTime::now(),
            memory: resources.memory,
            cpu_load: resources.load_avg_1m,
            scheduler_lag_ms: self.scheduler_lag_ms.load(Ordering::Relaxed),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        };

        let trend = {
            let mut ring = self.ring.lock().await;
            ring.push(snapshot);
            ring.memory_trend(
                self.cfg.trend_window,
                self.cfg.trend_growth_ratio,
                self.cfg.leak_growth_pct,
            )
        };
        self.apply_memory_trend(trend).await;
        self.check_cpu(resources.load_avg_1m);

        let (total, unhealthy) = self.run_probes().await;
        self.check_deadlock(total, unhealthy).await;

        let probes_ok = unhealthy == 0;
        let frozen = self.freeze_latched.load(Ordering::SeqCst);
        let deadlocked = self.deadlock_latched.load(Ordering::SeqCst);
        self.transition_health(probes_ok && !frozen && !deadlocked);
    }

    async fn apply_memory_trend(&self, trend: MemoryTrend) {
        match trend {
            MemoryTrend::LeakSuspected { growth } => {
                if !self.leak_latched.swap(true, Ordering::SeqCst) {
                    let detail = format!("resident growth {:.1}% over trend window", growth * 100.0);
                    self.bus.publish(
                        Event::new(EventKind::MemoryLeakSuspected).with_reason(detail.clone()),
                    );
                    self.reporter
                        .handle(FaultKind::MemoryLeak, &detail, FaultContext::none())
                        .await;
                }
            }
            MemoryTrend::Stable => {
                self.leak_latched.store(false, Ordering::SeqCst);
            }
            MemoryTrend::Increasing { .. } => {}
        }
    }

    fn check_cpu(&self, load: Option<f64>) {
        if self.cfg.cpu_threshold <= 0.0 {
            return;
        }
        let Some(load) = load else { return };
        if load > self.cfg.cpu_threshold {
            tracing::warn!(load, threshold = self.cfg.cpu_threshold, "load average above threshold");
            self.bus.publish(
                Event::new(EventKind::HighCpu)
                    .with_reason(format!("load {load:.2} > {:.2}", self.cfg.cpu_threshold)),
            );
        }
    }

    /// Runs every probe raced against its timeout; updates statuses.
    ///
    /// Returns `(total, unhealthy)` counts for this sweep.
    async fn run_probes(&self) -> (usize, usize) {
        let targets: Vec<(usize, ProbeRef)> = {
            let probes = self.probes.read().await;
            probes
                .iter()
                .enumerate()
                .map(|(i, e)| (i, Arc::clone(&e.probe)))
                .collect()
        };
        if targets.is_empty() {
            return (0, 0);
        }

        let default_timeout = self.cfg.probe_timeout;
        let checks = targets.iter().map(|(_, probe)| {
            let probe = Arc::clone(probe);
            async move {
                let timeout = probe.timeout().unwrap_or(default_timeout);
                match tokio::time::timeout(timeout, probe.check()).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(ProbeError::Timeout { timeout }),
                }
            }
        });
        let results = futures::future::join_all(checks).await;

        let mut unhealthy = 0;
        let now = SystemTime::now();
        let mut probes = self.probes.write().await;
        for ((index, _), result) in targets.iter().zip(results) {
            let entry = &mut probes[*index];
            entry.status.last_check = Some(now);
            match result {
                Ok(()) => {
                    entry.status.healthy = true;
                    entry.status.last_error = None;
                }
                Err(err) => {
                    unhealthy += 1;
                    let was_healthy = entry.status.healthy;
                    entry.status.healthy = false;
                    entry.status.last_error = Some(err.to_string());
                    tracing::warn!(probe = entry.probe.name(), error = %err, "probe unhealthy");
                    if was_healthy {
                        self.bus.publish(
                            Event::new(EventKind::ProbeFailed)
                                .with_feature(entry.probe.name().to_string())
                                .with_reason(err.to_string()),
                        );
                    }
                }
            }
        }
        (probes.len(), unhealthy)
    }

    /// Majority rule: more than half of all probes unhealthy at once.
    ///
    /// A heuristic for a wedged process, not proof of deadlock; the
    /// majority fraction deliberately stays crude.
    async fn check_deadlock(&self, total: usize, unhealthy: usize) {
        if total == 0 || unhealthy * 2 <= total {
            self.deadlock_latched.store(false, Ordering::SeqCst);
            return;
        }
        if self.deadlock_latched.swap(true, Ordering::SeqCst) {
            return;
        }

        let detail = format!("{unhealthy} of {total} probes unhealthy");
        self.bus.publish(
            Event::new(EventKind::DeadlockSuspected)
                .with_attempt(unhealthy as u32)
                .with_reason(detail.clone()),
        );
        self.reporter
            .handle(FaultKind::Deadlock, &detail, FaultContext::none())
            .await;
        self.escalate("deadlock", &detail).await;
    }

    fn transition_health(&self, healthy: bool) {
        let was = self.healthy.swap(healthy, Ordering::SeqCst);
        if was != healthy {
            let state = if healthy { "healthy" } else { "unhealthy" };
            tracing::info!(state, "aggregate health changed");
            self.bus
                .publish(Event::new(EventKind::HealthChanged).with_reason(state));
        }
    }

    /// Escalates a fatal-class finding under the restart budget.
    ///
    /// Publishes `FatalFault` with the finding's label as the reason prefix;
    /// the coordinator maps `freeze`/`deadlock` to distinct exit codes (or
    /// resets in continuous mode). Does nothing when auto-restart is off.
    async fn escalate(&self, label: &str, detail: &str) {
        if !self.cfg.auto_restart {
            return;
        }

        let granted = {
            let mut budget = self.restarts.lock().await;
            match budget.grant(self.cfg.max_restarts, self.cfg.restart_window) {
                Some(_) => true,
                None => {
                    if !budget.exhausted_reported {
                        budget.exhausted_reported = true;
                        self.bus.publish(
                            Event::new(EventKind::MaxRestartsReached)
                                .with_attempt(self.cfg.max_restarts),
                        );
                    }
                    false
                }
            }
        };

        if granted {
            self.bus.publish(
                Event::new(EventKind::FatalFault).with_reason(format!("{label}: {detail}")),
            );
        }
    }
}
