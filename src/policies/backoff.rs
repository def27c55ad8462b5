//! # Delay schedule for retried operations.
//!
//! [`BackoffPolicy`] turns an attempt number into a sleep duration: the
//! delay grows geometrically (`base × factor^attempt`), is clamped to
//! `cap`, and is then randomized by the configured [`JitterPolicy`].
//!
//! Each attempt's delay is derived from the attempt number alone, so a
//! jittered outcome never feeds back into later attempts — schedules
//! cannot drift shorter (or longer) through accumulated randomness.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use corevisor::{BackoffPolicy, JitterPolicy};
//!
//! let schedule = BackoffPolicy {
//!     base: Duration::from_millis(250),
//!     cap: Duration::from_secs(8),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(schedule.delay_for(0), Duration::from_millis(250));
//! assert_eq!(schedule.delay_for(2), Duration::from_secs(1));
//! // 250ms × 2^10 would be 256s; the cap wins.
//! assert_eq!(schedule.delay_for(10), Duration::from_secs(8));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Geometric retry-delay schedule with a hard cap.
///
/// [`ErrorReporter::with_retry`](crate::report::ErrorReporter::with_retry)
/// builds one of these from its `RetryOptions` (`base_delay` becomes
/// `base`, with `factor = 2.0` for plain doubling).
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay for attempt 0; also the floor for decorrelated jitter.
    pub base: Duration,
    /// Upper bound on any computed delay.
    pub cap: Duration,
    /// Geometric growth per attempt; `2.0` doubles every retry, `1.0`
    /// keeps the delay constant.
    pub factor: f64,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 100ms doubling up to 30s, no jitter.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Returns the (jittered) delay before retry `attempt` (0-indexed).
    ///
    /// Growth that overflows, or a `factor`/`base` combination that
    /// produces a non-finite or negative value, clamps to `cap`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);

        let clamped = if scaled.is_finite() && (0.0..=self.cap.as_secs_f64()).contains(&scaled) {
            Duration::from_secs_f64(scaled)
        } else {
            self.cap
        };

        self.jitter.spread(clamped, self.base.min(self.cap), self.cap)
    }
}
