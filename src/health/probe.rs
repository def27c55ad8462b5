//! # Health probe abstraction and function-backed implementation.
//!
//! This module defines the [`HealthProbe`] trait (async, timeout-bounded)
//! and a convenient function-backed implementation [`ProbeFn`]. The common
//! handle type is [`ProbeRef`], an `Arc<dyn HealthProbe>` suitable for
//! sharing with the monitor.
//!
//! Any feature may register probes; the monitor races each probe against
//! its timeout on every sweep and treats timeouts as failures.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProbeError;

/// Shared handle to a health probe.
pub type ProbeRef = Arc<dyn HealthProbe>;

/// # Named health check with its own timeout.
///
/// A probe returns `Ok(())` when the condition it watches is healthy.
/// Probes should be cheap; anything slower than its timeout is recorded as
/// unhealthy for that sweep.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use corevisor::{HealthProbe, ProbeError};
///
/// struct QueueDepth;
///
/// #[async_trait]
/// impl HealthProbe for QueueDepth {
///     fn name(&self) -> &str { "queue-depth" }
///
///     async fn check(&self) -> Result<(), ProbeError> {
///         // inspect the queue...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Returns a stable, human-readable probe name.
    fn name(&self) -> &str;

    /// Runs the check once.
    async fn check(&self) -> Result<(), ProbeError>;

    /// Per-probe timeout override.
    ///
    /// `None` uses the monitor's configured default.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Function-backed probe implementation.
///
/// Wraps a closure that *creates* a new future per check, so no state is
/// shared between sweeps unless the closure captures it explicitly.
pub struct ProbeFn<F> {
    name: Cow<'static, str>,
    timeout: Option<Duration>,
    f: F,
}

impl<F> ProbeFn<F> {
    /// Creates a new function-backed probe.
    ///
    /// Prefer [`ProbeFn::arc`] when you immediately need a [`ProbeRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            f,
        }
    }

    /// Sets a per-probe timeout override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates the probe and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use corevisor::{ProbeFn, ProbeRef, ProbeError};
    ///
    /// let p: ProbeRef = ProbeFn::arc("always-ok", || async {
    ///     Ok::<_, ProbeError>(())
    /// });
    /// assert_eq!(p.name(), "always-ok");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> HealthProbe for ProbeFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProbeError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<(), ProbeError> {
        (self.f)().await
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Last observed outcome of a registered probe.
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    /// When the probe last ran, if ever.
    pub last_check: Option<std::time::SystemTime>,
    /// Whether the last run succeeded. New probes start healthy.
    pub healthy: bool,
    /// The last failure message, if the probe is unhealthy.
    pub last_error: Option<String>,
}

impl ProbeStatus {
    pub(crate) fn new() -> Self {
        Self {
            last_check: None,
            healthy: true,
            last_error: None,
        }
    }
}
