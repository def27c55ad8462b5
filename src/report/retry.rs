//! # Retry with exponential backoff, and fail-fast guarding.
//!
//! [`ErrorReporter::with_retry`] executes an operation, retrying failures
//! with exponentially growing delays (`base_delay × 2^attempt`). One
//! success ends the sequence silently; exhausting the budget reports
//! [`FaultKind::RetryExhausted`] and returns the last error to the caller.
//!
//! [`ErrorReporter::guard`] wraps a call to a named service behind its
//! circuit breaker: an open circuit refuses the call without attempting it,
//! and outcomes of attempted calls are recorded on the breaker.
//!
//! ## Rules
//! - Retry sleeps elapse naturally within bounded windows; they never block
//!   signal handling (the coordinator runs independently).
//! - Failed attempts before a success are logged, not published — the
//!   sequence is only surfaced when it exhausts.

use std::future::Future;

use thiserror::Error;

use crate::policies::{BackoffPolicy, JitterPolicy};
use crate::report::reporter::{ErrorReporter, FaultContext, FaultKind};

/// Options for [`ErrorReporter::with_retry`].
#[derive(Clone, Copy, Debug)]
pub struct RetryOptions {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each subsequent retry.
    pub base_delay: std::time::Duration,
    /// Jitter applied to each computed delay.
    pub jitter: JitterPolicy,
}

impl Default for RetryOptions {
    /// Defaults: 3 retries, 100ms base delay, no jitter.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: std::time::Duration::from_millis(100),
            jitter: JitterPolicy::None,
        }
    }
}

impl RetryOptions {
    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: self.base_delay,
            cap: std::time::Duration::from_secs(30),
            factor: 2.0,
            jitter: self.jitter,
        }
    }
}

/// Error returned by [`ErrorReporter::guard`].
#[derive(Error, Debug)]
pub enum GuardError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("circuit open for service {service:?}; failing fast")]
    Open {
        /// The guarded service name.
        service: String,
    },

    /// The operation ran and failed; the failure was recorded.
    #[error("{0}")]
    Inner(E),
}

impl ErrorReporter {
    /// Executes `operation`, retrying failures with exponential backoff.
    ///
    /// The operation runs at most `1 + max_retries` times. The first success
    /// is returned immediately; earlier failures are logged but not
    /// reported. When every attempt fails, the reporter records
    /// [`FaultKind::RetryExhausted`] and the last error is returned.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        opts: RetryOptions,
        ctx: FaultContext,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let backoff = opts.backoff();
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= opts.max_retries {
                        self.handle(
                            FaultKind::RetryExhausted,
                            &format!("{} attempts failed; last error: {err}", attempt + 1),
                            ctx,
                        )
                        .await;
                        return Err(err);
                    }

                    let delay = backoff.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Runs `operation` against `service` behind its circuit breaker.
    ///
    /// - Open circuit: returns [`GuardError::Open`] without running the
    ///   operation (callers fail fast until cooldown).
    /// - Otherwise the operation runs; a success is recorded (closing a
    ///   half-open circuit), a failure is reported as [`FaultKind::Api`]
    ///   (feeding the breaker) and returned as [`GuardError::Inner`].
    pub async fn guard<T, E, F, Fut>(&self, service: &str, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if self.is_open(service).await {
            return Err(GuardError::Open {
                service: service.to_string(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success(service).await;
                Ok(value)
            }
            Err(err) => {
                self.handle(
                    FaultKind::Api,
                    &err.to_string(),
                    FaultContext::service(service),
                )
                .await;
                Err(GuardError::Inner(err))
            }
        }
    }
}
