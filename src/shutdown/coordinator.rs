//! # ShutdownCoordinator: phased, hook-ordered, drain-aware termination.
//!
//! ## Phase machine
//! ```text
//! Running → SignalReceived → DrainingNewWork → WaitingForOperations
//!         → ExecutingHooks → Cleanup → Terminated
//!
//! (continuous mode: Cleanup → Running — a reset, not a terminal state)
//! ```
//!
//! - **DrainingNewWork** flips a cooperative flag; feature entry points
//!   consult [`ShutdownCoordinator::is_draining`] and refuse new work.
//!   There is no hard enforcement.
//! - **WaitingForOperations** polls the tracked-operation set until empty
//!   or the grace deadline passes; stragglers are logged and shutdown
//!   proceeds anyway.
//! - **ExecutingHooks** runs each unexecuted hook exactly once, in strictly
//!   descending priority order; a hook failure is logged and does not block
//!   later hooks.
//!
//! ## Fatal path
//! The coordinator listens on the bus for `FatalFault` and funnels it into
//! [`force_shutdown`](ShutdownCoordinator::force_shutdown): drain and wait
//! are skipped, only hooks at or above the critical-priority cutoff run
//! (each under a tight timeout), and the exit code is distinct per fault
//! class (`freeze`, `deadlock`, other).
//!
//! ## Process exit
//! The library never calls `std::process::exit` itself:
//! [`ShutdownCoordinator::run`] resolves to the exit code and the host
//! passes it to the OS. In continuous mode, completed sequences reset
//! internal state, publish `RestartCycle`, and `run` keeps going.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::ShutdownConfig;
use crate::events::{Bus, Event, EventKind};
use crate::shutdown::signals;

/// Clean termination.
pub const EXIT_CLEAN: i32 = 0;
/// A shutdown hook failed during an otherwise orderly shutdown.
pub const EXIT_SHUTDOWN_ERROR: i32 = 1;
/// Forced shutdown after an unclassified fatal fault.
pub const EXIT_FATAL: i32 = 70;
/// Forced shutdown after freeze detection.
pub const EXIT_FREEZE: i32 = 71;
/// Forced shutdown after deadlock suspicion.
pub const EXIT_DEADLOCK: i32 = 72;

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation.
    Running,
    /// A signal or fatal escalation arrived.
    SignalReceived,
    /// New work is being refused (cooperatively).
    DrainingNewWork,
    /// Polling tracked operations against the grace deadline.
    WaitingForOperations,
    /// Hooks are executing in descending priority order.
    ExecutingHooks,
    /// Hooks done; deciding between exit and reset.
    Cleanup,
    /// Terminal state (normal mode only).
    Terminated,
}

/// How a completed shutdown sequence ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal mode: the host should exit with this code.
    Exit(i32),
    /// Continuous mode: state was reset; the process keeps running.
    Restarted,
}

type HookFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type HookHandler = Arc<dyn Fn() -> HookFuture + Send + Sync>;

struct Hook {
    name: String,
    priority: i32,
    executed: bool,
    handler: HookHandler,
}

/// An in-flight unit of work the coordinator waits for during drain.
#[derive(Debug, Clone)]
pub struct TrackedOperation {
    /// Monotonic operation id.
    pub id: u64,
    /// Operator-facing description.
    pub description: String,
    /// When the operation began.
    pub started_at: SystemTime,
}

type OperationTable = Arc<StdMutex<HashMap<u64, TrackedOperation>>>;

/// RAII registration of an in-flight operation.
///
/// Dropping the guard marks the operation complete.
pub struct OperationGuard {
    id: u64,
    table: OperationTable,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.remove(&self.id);
    }
}

/// Intercepts termination, drains work, and runs prioritized hooks.
pub struct ShutdownCoordinator {
    cfg: ShutdownConfig,
    bus: Bus,
    hooks: Mutex<Vec<Hook>>,
    operations: OperationTable,
    next_operation: AtomicU64,
    phase: StdRwLock<ShutdownPhase>,
    draining: AtomicBool,
    /// Serializes shutdown sequences; re-invocation is allowed (hooks'
    /// executed flags make it a no-op), overlap is not.
    sequence: Mutex<()>,
    cycles: AtomicU32,
}

impl ShutdownCoordinator {
    /// Creates a coordinator; nothing is armed until
    /// [`run`](ShutdownCoordinator::run) (or an explicit
    /// [`shutdown`](ShutdownCoordinator::shutdown)).
    pub fn new(cfg: ShutdownConfig, bus: Bus) -> Self {
        Self {
            cfg,
            bus,
            hooks: Mutex::new(Vec::new()),
            operations: Arc::new(StdMutex::new(HashMap::new())),
            next_operation: AtomicU64::new(1),
            phase: StdRwLock::new(ShutdownPhase::Running),
            draining: AtomicBool::new(false),
            sequence: Mutex::new(()),
            cycles: AtomicU32::new(0),
        }
    }

    /// Registers a shutdown hook.
    ///
    /// Hooks run in descending priority order, each exactly once per
    /// shutdown sequence. Hooks with priority at or above the configured
    /// critical cutoff also run during forced shutdown.
    pub async fn register_hook<F, Fut>(&self, name: impl Into<String>, priority: i32, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let mut hooks = self.hooks.lock().await;
        hooks.push(Hook {
            name: name.into(),
            priority,
            executed: false,
            handler: Arc::new(move || Box::pin(handler()) as HookFuture),
        });
    }

    /// Tracks an in-flight operation; drop the guard when done.
    ///
    /// Operations may still be opened while draining (cooperative model),
    /// but a warning is logged.
    pub fn begin_operation(&self, description: impl Into<String>) -> OperationGuard {
        let description = description.into();
        if self.is_draining() {
            tracing::warn!(operation = description.as_str(), "operation started while draining");
        }
        let id = self.next_operation.fetch_add(1, Ordering::Relaxed);
        let mut table = self.operations.lock().unwrap_or_else(|e| e.into_inner());
        table.insert(
            id,
            TrackedOperation {
                id,
                description,
                started_at: SystemTime::now(),
            },
        );
        OperationGuard {
            id,
            table: Arc::clone(&self.operations),
        }
    }

    /// Cooperative flag: feature entry points should refuse new work when
    /// this returns `true`.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// The current phase.
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Descriptions of currently tracked operations.
    pub fn outstanding_operations(&self) -> Vec<String> {
        let table = self.operations.lock().unwrap_or_else(|e| e.into_inner());
        table.values().map(|op| op.description.clone()).collect()
    }

    /// Arms the signal handler and fatal-fault listener, then drives
    /// shutdown sequences until one terminates the process.
    ///
    /// Resolves to the exit code the host should pass to the OS. In
    /// continuous mode completed sequences reset state and the loop
    /// continues.
    pub async fn run(&self) -> i32 {
        let mut rx = self.bus.subscribe();
        loop {
            tokio::select! {
                signal = signals::wait_for_shutdown_signal() => {
                    let received = match signal {
                        Ok(received) => received,
                        Err(err) => {
                            tracing::error!(error = %err, "signal registration failed");
                            return EXIT_SHUTDOWN_ERROR;
                        }
                    };
                    let reason = format!("signal {}", received.as_label());
                    match self.shutdown(&reason).await {
                        ExitOutcome::Exit(code) => return code,
                        ExitOutcome::Restarted => continue,
                    }
                }
                event = rx.recv() => match event {
                    Ok(ev) if ev.kind == EventKind::FatalFault => {
                        let reason = ev.reason.as_deref().unwrap_or("fatal fault").to_string();
                        match self.force_shutdown(&reason).await {
                            ExitOutcome::Exit(code) => return code,
                            ExitOutcome::Restarted => continue,
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        // Bus gone; nothing left to coordinate.
                        return EXIT_CLEAN;
                    }
                }
            }
        }
    }

    /// Runs the full shutdown sequence: drain, wait, hooks, cleanup.
    ///
    /// In normal mode resolves to the exit outcome; in continuous mode
    /// resets internal state and reports [`ExitOutcome::Restarted`].
    pub async fn shutdown(&self, reason: &str) -> ExitOutcome {
        let _seq = self.sequence.lock().await;
        tracing::info!(reason, "shutdown sequence starting");
        self.set_phase(ShutdownPhase::SignalReceived);
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        self.set_phase(ShutdownPhase::DrainingNewWork);
        self.draining.store(true, Ordering::SeqCst);

        self.set_phase(ShutdownPhase::WaitingForOperations);
        self.wait_for_operations().await;

        self.set_phase(ShutdownPhase::ExecutingHooks);
        let hook_failures = self.run_hooks(i32::MIN, None).await;

        self.set_phase(ShutdownPhase::Cleanup);
        self.finish(hook_failures > 0, None).await
    }

    /// Bypasses draining and waiting: only hooks at or above the critical
    /// cutoff run, each under the forced per-hook timeout, then the
    /// process exits non-zero (or resets in continuous mode).
    pub async fn force_shutdown(&self, reason: &str) -> ExitOutcome {
        let _seq = self.sequence.lock().await;
        tracing::error!(reason, "forced shutdown");
        self.set_phase(ShutdownPhase::SignalReceived);
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.draining.store(true, Ordering::SeqCst);

        self.set_phase(ShutdownPhase::ExecutingHooks);
        self.run_hooks(
            self.cfg.critical_priority_cutoff,
            Some(self.cfg.force_hook_timeout),
        )
        .await;

        self.set_phase(ShutdownPhase::Cleanup);
        // Let logs and subscriber queues flush before the host exits.
        tokio::time::sleep(self.cfg.force_exit_delay).await;
        self.finish(true, Some(exit_code_for(reason))).await
    }

    // ---------------------------
    // Sequence steps
    // ---------------------------

    /// Polls the operation table until empty or the grace deadline.
    async fn wait_for_operations(&self) {
        let grace = self.cfg.grace;
        let deadline = Instant::now() + grace;

        loop {
            let outstanding = self.outstanding_operations();
            if outstanding.is_empty() {
                self.bus.publish(Event::new(EventKind::OperationsDrained));
                return;
            }
            if grace.is_zero() || Instant::now() >= deadline {
                tracing::warn!(
                    outstanding = outstanding.len(),
                    operations = ?outstanding,
                    "grace period exceeded, proceeding with shutdown"
                );
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_reason(outstanding.join(", "))
                        .with_timeout(grace),
                );
                return;
            }
            tokio::time::sleep(self.cfg.drain_poll_interval).await;
        }
    }

    /// Runs unexecuted hooks with `priority >= min_priority` in descending
    /// priority order (stable for equal priorities). Returns the failure
    /// count.
    async fn run_hooks(&self, min_priority: i32, per_hook_timeout: Option<Duration>) -> usize {
        let mut hooks = self.hooks.lock().await;
        hooks.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut failures = 0;
        for hook in hooks.iter_mut() {
            if hook.executed || hook.priority < min_priority {
                continue;
            }
            hook.executed = true;

            let fut = (hook.handler)();
            let result = match per_hook_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(format!("hook timed out after {limit:?}")),
                },
                None => fut.await,
            };

            match result {
                Ok(()) => {
                    tracing::debug!(hook = hook.name.as_str(), priority = hook.priority, "hook executed");
                }
                Err(err) => {
                    failures += 1;
                    tracing::warn!(hook = hook.name.as_str(), error = err.as_str(), "hook failed, continuing");
                    self.bus.publish(
                        Event::new(EventKind::HookFailed)
                            .with_feature(hook.name.clone())
                            .with_reason(err),
                    );
                }
            }
        }
        failures
    }

    /// Terminal step: exit in normal mode, reset in continuous mode.
    async fn finish(&self, had_errors: bool, forced_code: Option<i32>) -> ExitOutcome {
        if self.cfg.continuous {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            self.draining.store(false, Ordering::SeqCst);
            {
                // New cycle: hooks are eligible to run again.
                let mut hooks = self.hooks.lock().await;
                for hook in hooks.iter_mut() {
                    hook.executed = false;
                }
            }
            self.set_phase(ShutdownPhase::Running);
            tracing::info!(cycle, "continuous mode: internal state reset");
            self.bus
                .publish(Event::new(EventKind::RestartCycle).with_attempt(cycle));
            return ExitOutcome::Restarted;
        }

        self.set_phase(ShutdownPhase::Terminated);
        self.bus.publish(Event::new(EventKind::ShutdownComplete));
        let code = forced_code.unwrap_or(if had_errors {
            EXIT_SHUTDOWN_ERROR
        } else {
            EXIT_CLEAN
        });
        ExitOutcome::Exit(code)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        *self.phase.write().unwrap_or_else(|e| e.into_inner()) = phase;
    }
}

/// Maps a fatal-fault reason to its exit code.
///
/// Reasons are prefixed with the fault label (`freeze: …`, `deadlock: …`);
/// unrecognized reasons get the generic fatal code.
fn exit_code_for(reason: &str) -> i32 {
    if reason.starts_with("freeze") {
        EXIT_FREEZE
    } else if reason.starts_with("deadlock") {
        EXIT_DEADLOCK
    } else {
        EXIT_FATAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as SyncMutex;

    fn coordinator(mut tweak: impl FnMut(&mut ShutdownConfig)) -> (Arc<ShutdownCoordinator>, Bus) {
        let bus = Bus::new(128);
        let mut cfg = ShutdownConfig::default();
        tweak(&mut cfg);
        (Arc::new(ShutdownCoordinator::new(cfg, bus.clone())), bus)
    }

    async fn register_order_hooks(
        coord: &ShutdownCoordinator,
        order: &Arc<SyncMutex<Vec<i32>>>,
        priorities: &[i32],
    ) {
        for &priority in priorities {
            let order = Arc::clone(order);
            coord
                .register_hook(format!("hook-{priority}"), priority, move || {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().unwrap().push(priority);
                        Ok(())
                    }
                })
                .await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hooks_run_in_descending_priority_once() {
        let (coord, _bus) = coordinator(|c| c.grace = Duration::ZERO);
        let order = Arc::new(SyncMutex::new(Vec::new()));
        register_order_hooks(&coord, &order, &[10, 100, 50]).await;

        let outcome = coord.shutdown("test").await;
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_CLEAN));
        assert_eq!(*order.lock().unwrap(), vec![100, 50, 10]);
        assert_eq!(coord.phase(), ShutdownPhase::Terminated);

        // Re-invocation must not re-execute any hook.
        let outcome = coord.shutdown("again").await;
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_CLEAN));
        assert_eq!(*order.lock().unwrap(), vec![100, 50, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_failure_does_not_block_later_hooks() {
        let (coord, bus) = coordinator(|c| c.grace = Duration::ZERO);
        let mut rx = bus.subscribe();
        let order = Arc::new(SyncMutex::new(Vec::new()));

        coord
            .register_hook("bad", 100, || async { Err("hook bug".to_string()) })
            .await;
        register_order_hooks(&coord, &order, &[50]).await;

        let outcome = coord.shutdown("test").await;
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_SHUTDOWN_ERROR));
        assert_eq!(*order.lock().unwrap(), vec![50]);

        let mut saw_hook_failed = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::HookFailed {
                assert_eq!(ev.feature.as_deref(), Some("bad"));
                saw_hook_failed = true;
            }
        }
        assert!(saw_hook_failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_guards() {
        let (coord, bus) = coordinator(|c| {
            c.grace = Duration::from_secs(30);
            c.drain_poll_interval = Duration::from_millis(100);
        });
        let mut rx = bus.subscribe();

        let guard = coord.begin_operation("inflight request");
        assert_eq!(coord.outstanding_operations(), vec!["inflight request"]);

        let coord_in_task = Arc::clone(&coord);
        let sequence = tokio::spawn(async move { coord_in_task.shutdown("test").await });

        // Let the drain loop observe the operation, then complete it.
        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(guard);

        let outcome = sequence.await.unwrap();
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_CLEAN));

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::OperationsDrained));
        assert!(!kinds.contains(&EventKind::GraceExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_deadline_logs_stragglers_and_proceeds() {
        let (coord, bus) = coordinator(|c| {
            c.grace = Duration::from_secs(5);
            c.drain_poll_interval = Duration::from_millis(100);
        });
        let mut rx = bus.subscribe();

        let _guard = coord.begin_operation("stuck export");
        let outcome = coord.shutdown("test").await;
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_CLEAN));

        let mut grace_reason = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::GraceExceeded {
                grace_reason = ev.reason.clone();
            }
        }
        assert!(grace_reason.unwrap().contains("stuck export"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_mode_resets_instead_of_exiting() {
        let (coord, bus) = coordinator(|c| {
            c.grace = Duration::ZERO;
            c.continuous = true;
        });
        let mut rx = bus.subscribe();
        let order = Arc::new(SyncMutex::new(Vec::new()));
        register_order_hooks(&coord, &order, &[10]).await;

        assert_eq!(coord.shutdown("first").await, ExitOutcome::Restarted);
        assert_eq!(coord.phase(), ShutdownPhase::Running);
        assert!(!coord.is_draining());

        // A second cycle runs the hooks again.
        assert_eq!(coord.shutdown("second").await, ExitOutcome::Restarted);
        assert_eq!(*order.lock().unwrap(), vec![10, 10]);

        let cycles: Vec<u32> = {
            let mut found = Vec::new();
            while let Ok(ev) = rx.try_recv() {
                if ev.kind == EventKind::RestartCycle {
                    found.push(ev.attempt.unwrap());
                }
            }
            found
        };
        assert_eq!(cycles, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_shutdown_runs_only_critical_hooks() {
        let (coord, _bus) = coordinator(|c| {
            c.critical_priority_cutoff = 100;
            c.force_hook_timeout = Duration::from_secs(5);
            c.force_exit_delay = Duration::from_millis(500);
        });
        let order = Arc::new(SyncMutex::new(Vec::new()));
        register_order_hooks(&coord, &order, &[10, 150, 100]).await;

        let outcome = coord.force_shutdown("freeze: no heartbeat for 31s").await;
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_FREEZE));
        assert_eq!(*order.lock().unwrap(), vec![150, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_shutdown_times_out_stuck_hooks() {
        let (coord, _bus) = coordinator(|c| {
            c.critical_priority_cutoff = 100;
            c.force_hook_timeout = Duration::from_secs(5);
        });
        coord
            .register_hook("stuck", 200, || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        let outcome = coord.force_shutdown("deadlock: 3 of 4 probes unhealthy").await;
        assert_eq!(outcome, ExitOutcome::Exit(EXIT_DEADLOCK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_fault_on_bus_drives_forced_exit() {
        let (coord, bus) = coordinator(|c| c.force_exit_delay = Duration::from_millis(100));

        let coord_in_task = Arc::clone(&coord);
        let running = tokio::spawn(async move { coord_in_task.run().await });

        // Give run() a tick to subscribe before publishing.
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(Event::new(EventKind::FatalFault).with_reason("uncaught_panic: boom"));

        let code = running.await.unwrap();
        assert_eq!(code, EXIT_FATAL);
    }

    #[tokio::test]
    async fn test_exit_code_mapping() {
        assert_eq!(exit_code_for("freeze: stale heartbeat"), EXIT_FREEZE);
        assert_eq!(exit_code_for("deadlock: majority unhealthy"), EXIT_DEADLOCK);
        assert_eq!(exit_code_for("uncaught_panic: boom"), EXIT_FATAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draining_flag_flips_during_sequence() {
        let (coord, _bus) = coordinator(|c| c.grace = Duration::ZERO);
        assert!(!coord.is_draining());
        coord.shutdown("test").await;
        assert!(coord.is_draining());
    }
}
