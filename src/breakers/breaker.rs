//! # Per-service circuit breaker state machine.
//!
//! A [`CircuitBreaker`] isolates a failing named resource so callers can
//! fail fast instead of piling onto it.
//!
//! ## Transitions
//! ```text
//! Closed ──(failures ≥ threshold)──► Open
//! Open ──(cooldown elapsed, observed on next read)──► HalfOpen
//! HalfOpen ──(success)──► Closed   (failure count reset to 0)
//! HalfOpen ──(failure)──► Open     (opened_at refreshed)
//! ```
//!
//! The `Open → HalfOpen` transition is lazy: it happens when state is next
//! observed after the cooldown, not on a timer.

use std::time::Duration;

use tokio::time::Instant;

/// State of a single circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally; failures are being counted.
    Closed,
    /// Calls must fail fast until the cooldown elapses.
    Open,
    /// Cooldown elapsed; one trial call decides the next state.
    HalfOpen,
}

impl CircuitState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Failure tracking for one named service.
///
/// Owned by [`CircuitBreakerRegistry`](crate::breakers::CircuitBreakerRegistry);
/// created lazily on the first recorded failure and never explicitly
/// destroyed (bounded by the number of distinct service names).
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Consecutive failure count while closed.
    pub failures: u32,
    /// Current circuit state.
    pub state: CircuitState,
    /// When the circuit last opened (`None` while it has never opened).
    pub opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Creates a fresh closed circuit.
    pub fn new() -> Self {
        Self {
            failures: 0,
            state: CircuitState::Closed,
            opened_at: None,
        }
    }

    /// Records a failure. Returns the new state if a transition occurred.
    pub fn on_failure(&mut self, threshold: u32, now: Instant) -> Option<CircuitState> {
        match self.state {
            CircuitState::Closed => {
                self.failures += 1;
                if self.failures >= threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                    return Some(CircuitState::Open);
                }
                None
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                Some(CircuitState::Open)
            }
            CircuitState::Open => {
                self.failures += 1;
                None
            }
        }
    }

    /// Records a success. Returns the new state if a transition occurred.
    ///
    /// A success in any state resets the consecutive-failure count; a
    /// success while half-open closes the circuit.
    pub fn on_success(&mut self) -> Option<CircuitState> {
        self.failures = 0;
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.opened_at = None;
                Some(CircuitState::Closed)
            }
            _ => None,
        }
    }

    /// Applies the lazy `Open → HalfOpen` transition if the cooldown has
    /// elapsed. Returns the new state if a transition occurred.
    pub fn poll(&mut self, cooldown: Duration, now: Instant) -> Option<CircuitState> {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if now.duration_since(opened_at) >= cooldown {
                    self.state = CircuitState::HalfOpen;
                    return Some(CircuitState::HalfOpen);
                }
            }
        }
        None
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_opens_at_threshold() {
        let mut cb = CircuitBreaker::new();
        let now = Instant::now();

        assert_eq!(cb.on_failure(3, now), None);
        assert_eq!(cb.on_failure(3, now), None);
        assert_eq!(cb.on_failure(3, now), Some(CircuitState::Open));
        assert_eq!(cb.state, CircuitState::Open);
        assert_eq!(cb.failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_half_opens_on_poll() {
        let mut cb = CircuitBreaker::new();
        let cooldown = Duration::from_secs(60);

        cb.on_failure(1, Instant::now());
        assert_eq!(cb.state, CircuitState::Open);

        assert_eq!(cb.poll(cooldown, Instant::now()), None);

        tokio::time::advance(cooldown).await;
        assert_eq!(cb.poll(cooldown, Instant::now()), Some(CircuitState::HalfOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_and_resets() {
        let mut cb = CircuitBreaker::new();
        cb.on_failure(1, Instant::now());
        tokio::time::advance(Duration::from_secs(60)).await;
        cb.poll(Duration::from_secs(60), Instant::now());

        assert_eq!(cb.on_success(), Some(CircuitState::Closed));
        assert_eq!(cb.failures, 0);
        assert!(cb.opened_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new();
        cb.on_failure(1, Instant::now());
        tokio::time::advance(Duration::from_secs(60)).await;
        cb.poll(Duration::from_secs(60), Instant::now());
        assert_eq!(cb.state, CircuitState::HalfOpen);

        let reopened_at = Instant::now();
        assert_eq!(cb.on_failure(1, reopened_at), Some(CircuitState::Open));
        assert_eq!(cb.opened_at, Some(reopened_at));
    }
}
