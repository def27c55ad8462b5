//! # Global framework configuration.
//!
//! Provides [`Config`] — centralized settings for the supervision framework,
//! grouped by owning component:
//!
//! - [`HealthConfig`] — heartbeat/sweep cadence, freeze and resource
//!   thresholds, restart budget;
//! - [`BreakerConfig`] — circuit-breaker threshold and cooldown;
//! - [`ShutdownConfig`] — grace period, force-shutdown behavior,
//!   continuous mode.
//!
//! Config is consumed once at [`CoreContext`](crate::context::CoreContext)
//! construction and copied into the owning components.
//!
//! ## Sentinel values
//! - `bus_capacity` is clamped to a minimum of 1 by the bus.
//! - `HealthConfig::cpu_threshold = 0.0` → CPU check disabled.
//! - `ShutdownConfig::grace = 0s` → no drain wait, hooks run immediately.
//!
//! ## Environment overrides
//! [`Config::from_env`] starts from defaults and applies the documented
//! `COREVISOR_*` variables. Unparseable values are ignored with a warning,
//! never fatal.

use std::time::Duration;

/// Global configuration for the supervision framework.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events will
    /// observe `Lagged` and skip older items. Minimum value is 1 (enforced
    /// by the bus).
    pub bus_capacity: usize,

    /// Health monitoring settings.
    pub health: HealthConfig,

    /// Circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Shutdown coordination settings.
    pub shutdown: ShutdownConfig,
}

/// Health monitor settings: cadence, thresholds, and the restart budget.
#[derive(Clone, Debug)]
pub struct HealthConfig {
    /// Interval between heartbeat updates (the "I am alive" timestamp).
    pub heartbeat_interval: Duration,

    /// Interval between health-check sweeps (probes + resource sampling).
    pub check_interval: Duration,

    /// Interval between freeze-detection checks.
    pub freeze_check_interval: Duration,

    /// Maximum heartbeat age before the process is considered frozen.
    pub freeze_threshold: Duration,

    /// Number of snapshots retained for trend analysis (ring buffer size).
    ///
    /// Values in the 20–100 range give the trend heuristic enough history
    /// without unbounded growth; oldest entries are evicted on overflow.
    pub snapshot_capacity: usize,

    /// Number of trailing snapshots examined by the memory-trend heuristic.
    pub trend_window: usize,

    /// Fraction of consecutive growing samples (in the trend window) above
    /// which memory is classified as "increasing". Heuristic, not proof.
    pub trend_growth_ratio: f64,

    /// Relative heap growth over the trend window above which a leak is
    /// suspected (e.g. `0.15` = 15%). Heuristic, not proof; advisory only.
    pub leak_growth_pct: f64,

    /// 1-minute load average above which `HighCpu` is emitted.
    ///
    /// `0.0` disables the CPU check.
    pub cpu_threshold: f64,

    /// Default timeout for probes that do not override their own.
    pub probe_timeout: Duration,

    /// Whether freeze/deadlock detection may request automatic restarts.
    ///
    /// When `false`, detection still emits events but never escalates to
    /// the restart or fatal paths.
    pub auto_restart: bool,

    /// Maximum automatic restarts within [`HealthConfig::restart_window`].
    ///
    /// Exceeding the budget emits `MaxRestartsReached` and stops automatic
    /// recovery until the window rolls over.
    pub max_restarts: u32,

    /// Rolling window over which [`HealthConfig::max_restarts`] applies.
    pub restart_window: Duration,
}

/// Circuit breaker settings.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures after which a closed circuit opens.
    pub failure_threshold: u32,

    /// How long an open circuit waits before the next read observes
    /// half-open.
    pub cooldown: Duration,
}

/// Shutdown coordination settings.
#[derive(Clone, Debug)]
pub struct ShutdownConfig {
    /// Maximum time to wait for tracked operations to drain before hooks run.
    ///
    /// Operations still outstanding at the deadline are logged and shutdown
    /// proceeds anyway.
    pub grace: Duration,

    /// Polling interval while waiting for tracked operations to drain.
    pub drain_poll_interval: Duration,

    /// Hooks with priority at or above this value run even during
    /// [`force_shutdown`](crate::shutdown::ShutdownCoordinator::force_shutdown).
    pub critical_priority_cutoff: i32,

    /// Per-hook timeout applied during forced shutdown.
    pub force_hook_timeout: Duration,

    /// Delay before the process exits on a fatal fault, allowing logs and
    /// subscriber queues to flush.
    pub force_exit_delay: Duration,

    /// Continuous mode: a completed shutdown sequence resets internal state
    /// and emits a restart event instead of exiting the process.
    pub continuous: bool,
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - health: heartbeat 5s, sweep 10s, freeze threshold 30s, 50 snapshots,
    ///   15% leak growth, 5 restarts / 10 min, auto-restart on
    /// - breaker: 5 failures, 60s cooldown
    /// - shutdown: 30s grace, cutoff 100, 5s per forced hook, not continuous
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            health: HealthConfig::default(),
            breaker: BreakerConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            check_interval: Duration::from_secs(10),
            freeze_check_interval: Duration::from_secs(5),
            freeze_threshold: Duration::from_secs(30),
            snapshot_capacity: 50,
            trend_window: 6,
            trend_growth_ratio: 0.8,
            leak_growth_pct: 0.15,
            cpu_threshold: 0.9,
            probe_timeout: Duration::from_secs(5),
            auto_restart: true,
            max_restarts: 5,
            restart_window: Duration::from_secs(600),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            drain_poll_interval: Duration::from_millis(100),
            critical_priority_cutoff: 100,
            force_hook_timeout: Duration::from_secs(5),
            force_exit_delay: Duration::from_millis(500),
            continuous: false,
        }
    }
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Builds a configuration from defaults plus `COREVISOR_*` environment
    /// overrides.
    ///
    /// Recognized variables (all optional):
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `COREVISOR_HEARTBEAT_INTERVAL_MS` | `health.heartbeat_interval` |
    /// | `COREVISOR_CHECK_INTERVAL_MS` | `health.check_interval` |
    /// | `COREVISOR_FREEZE_THRESHOLD_MS` | `health.freeze_threshold` |
    /// | `COREVISOR_CPU_THRESHOLD` | `health.cpu_threshold` |
    /// | `COREVISOR_LEAK_GROWTH_PCT` | `health.leak_growth_pct` |
    /// | `COREVISOR_MAX_RESTARTS` | `health.max_restarts` |
    /// | `COREVISOR_AUTO_RESTART` | `health.auto_restart` |
    /// | `COREVISOR_BREAKER_THRESHOLD` | `breaker.failure_threshold` |
    /// | `COREVISOR_BREAKER_COOLDOWN_MS` | `breaker.cooldown` |
    /// | `COREVISOR_GRACE_MS` | `shutdown.grace` |
    /// | `COREVISOR_FORCE_EXIT_DELAY_MS` | `shutdown.force_exit_delay` |
    /// | `COREVISOR_CONTINUOUS` | `shutdown.continuous` |
    ///
    /// Values that fail to parse are skipped with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        read_duration_ms("COREVISOR_HEARTBEAT_INTERVAL_MS", &mut cfg.health.heartbeat_interval);
        read_duration_ms("COREVISOR_CHECK_INTERVAL_MS", &mut cfg.health.check_interval);
        read_duration_ms("COREVISOR_FREEZE_THRESHOLD_MS", &mut cfg.health.freeze_threshold);
        read_parsed("COREVISOR_CPU_THRESHOLD", &mut cfg.health.cpu_threshold);
        read_parsed("COREVISOR_LEAK_GROWTH_PCT", &mut cfg.health.leak_growth_pct);
        read_parsed("COREVISOR_MAX_RESTARTS", &mut cfg.health.max_restarts);
        read_bool("COREVISOR_AUTO_RESTART", &mut cfg.health.auto_restart);
        read_parsed("COREVISOR_BREAKER_THRESHOLD", &mut cfg.breaker.failure_threshold);
        read_duration_ms("COREVISOR_BREAKER_COOLDOWN_MS", &mut cfg.breaker.cooldown);
        read_duration_ms("COREVISOR_GRACE_MS", &mut cfg.shutdown.grace);
        read_duration_ms("COREVISOR_FORCE_EXIT_DELAY_MS", &mut cfg.shutdown.force_exit_delay);
        read_bool("COREVISOR_CONTINUOUS", &mut cfg.shutdown.continuous);

        cfg
    }
}

fn read_parsed<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(var, value = %raw, "ignoring unparseable override"),
        }
    }
}

fn read_duration_ms(var: &str, slot: &mut Duration) {
    let mut ms = slot.as_millis() as u64;
    read_parsed(var, &mut ms);
    *slot = Duration::from_millis(ms);
}

fn read_bool(var: &str, slot: &mut bool) {
    if let Ok(raw) = std::env::var(var) {
        match raw.as_str() {
            "1" | "true" | "yes" | "on" => *slot = true,
            "0" | "false" | "no" | "off" => *slot = false,
            _ => tracing::warn!(var, value = %raw, "ignoring unparseable override"),
        }
    }
}
