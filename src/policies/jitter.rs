//! # Randomized spreading of retry delays.
//!
//! When many callers back off from the same failing resource on identical
//! schedules, they retry in lockstep and hit it together again.
//! [`JitterPolicy`] breaks the lockstep by randomizing each computed delay
//! before it is slept.
//!
//! All strategies take the clamped backoff delay as input; `Decorrelated`
//! additionally consults the schedule's floor and cap.

use std::time::Duration;

use rand::Rng;

/// How a computed backoff delay is randomized before sleeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Sleep exactly the computed delay.
    ///
    /// Predictable; fine when a single caller retries, and in tests.
    #[default]
    None,

    /// Sleep a uniform random duration in `[0, delay]`.
    ///
    /// The most aggressive spreading; can shorten waits substantially.
    Full,

    /// Sleep `delay / 2` plus a uniform random duration in `[0, delay / 2]`.
    ///
    /// Keeps at least half of the schedule while still de-synchronizing
    /// callers; a good default under contention.
    Equal,

    /// Sleep a uniform random duration in `[floor, min(3 × delay, cap)]`.
    ///
    /// The usual decorrelated formulation: the upper bound tracks the
    /// current delay rather than the schedule, while the floor keeps
    /// retries from collapsing to zero.
    Decorrelated,
}

impl JitterPolicy {
    /// Randomizes `delay` according to the strategy.
    ///
    /// `floor` and `cap` bound the `Decorrelated` range; the other
    /// strategies ignore them.
    pub fn spread(&self, delay: Duration, floor: Duration, cap: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => random_up_to(as_ms(delay)),
            JitterPolicy::Equal => {
                let half = as_ms(delay) / 2;
                Duration::from_millis(half) + random_up_to(half)
            }
            JitterPolicy::Decorrelated => {
                let lo = as_ms(floor).min(as_ms(cap));
                let hi = as_ms(delay).saturating_mul(3).min(as_ms(cap));
                if hi <= lo {
                    return Duration::from_millis(lo);
                }
                Duration::from_millis(rand::rng().random_range(lo..=hi))
            }
        }
    }
}

#[inline]
fn as_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

fn random_up_to(ms: u64) -> Duration {
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}
