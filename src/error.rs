//! Error types used by the corevisor framework and its features.
//!
//! This module defines the main error enums:
//!
//! - [`FrameworkError`] — errors raised by the orchestration framework itself
//!   (dependency resolution, startup aborts, shutdown overruns, open circuits).
//! - [`FeatureError`] — errors raised by individual feature lifecycle calls.
//! - [`ProbeError`] — errors raised by health-check probes.
//!
//! All types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics and utilities such as [`FeatureError::is_retryable`].

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the supervision framework.
///
/// These represent failures of the orchestration machinery, as opposed to
/// failures of the features it supervises. Configuration-time errors
/// ([`FrameworkError::CircularDependency`], [`FrameworkError::MissingDependency`])
/// are always fatal to startup; [`FrameworkError::FeatureInit`] and
/// [`FrameworkError::FeatureStart`] are raised only for **critical** features
/// (non-critical failures are recorded on feature status instead).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// The dependency graph contains a cycle; no valid startup order exists.
    #[error("circular feature dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The cycle path, starting and ending at the same feature.
        cycle: Vec<String>,
    },

    /// A feature declared a dependency that was never registered.
    #[error("feature {feature:?} depends on unregistered feature {dependency:?}")]
    MissingDependency {
        /// The feature that declared the dependency.
        feature: String,
        /// The dependency name that could not be resolved.
        dependency: String,
    },

    /// A critical feature failed to initialize; the startup sequence aborted.
    #[error("critical feature {feature:?} failed to initialize: {source}")]
    FeatureInit {
        /// Name of the failed feature.
        feature: String,
        /// The underlying lifecycle error.
        source: FeatureError,
    },

    /// A critical feature failed to start; the startup sequence aborted.
    #[error("critical feature {feature:?} failed to start: {source}")]
    FeatureStart {
        /// Name of the failed feature.
        feature: String,
        /// The underlying lifecycle error.
        source: FeatureError,
    },

    /// The circuit for a named service is open; the call was refused without
    /// being attempted.
    #[error("circuit open for service {service:?}; failing fast")]
    CircuitOpen {
        /// The service whose circuit is open.
        service: String,
    },

    /// Shutdown grace period was exceeded; some operations remained in flight
    /// when hook execution began.
    #[error("shutdown grace {grace:?} exceeded; outstanding: {outstanding:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Descriptions of operations still in flight at the deadline.
        outstanding: Vec<String>,
    },
}

impl FrameworkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FrameworkError::CircularDependency { .. } => "circular_dependency",
            FrameworkError::MissingDependency { .. } => "missing_dependency",
            FrameworkError::FeatureInit { .. } => "feature_init_failed",
            FrameworkError::FeatureStart { .. } => "feature_start_failed",
            FrameworkError::CircuitOpen { .. } => "circuit_open",
            FrameworkError::GraceExceeded { .. } => "grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by feature lifecycle calls.
///
/// Returned by [`Feature::initialize`](crate::features::Feature::initialize),
/// [`Feature::start`](crate::features::Feature::start) and
/// [`Feature::stop`](crate::features::Feature::stop). Whether a failure
/// aborts startup depends on the feature's `critical` flag, not on the
/// variant; the variant records whether a retry could plausibly succeed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FeatureError {
    /// The call failed but may succeed if retried.
    #[error("{error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; restarting the feature will not help.
    #[error("fatal: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The call exceeded its timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The call observed cancellation and exited early.
    #[error("cancelled")]
    Canceled,
}

impl FeatureError {
    /// Convenience constructor for [`FeatureError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        FeatureError::Fail {
            error: error.into(),
        }
    }

    /// Convenience constructor for [`FeatureError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        FeatureError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FeatureError::Fail { .. } => "feature_failed",
            FeatureError::Fatal { .. } => "feature_fatal",
            FeatureError::Timeout { .. } => "feature_timeout",
            FeatureError::Canceled => "feature_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// Returns `true` for [`FeatureError::Fail`] and [`FeatureError::Timeout`],
    /// `false` otherwise.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeatureError::Fail { .. } | FeatureError::Timeout { .. }
        )
    }
}

/// # Errors produced by health-check probes.
///
/// A probe that returns an error (or exceeds its timeout, which the monitor
/// converts to [`ProbeError::Timeout`]) is marked unhealthy for that sweep.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe ran and reported an unhealthy condition.
    #[error("{0}")]
    Unhealthy(String),

    /// The probe did not complete within its timeout.
    #[error("probe timed out after {timeout:?}")]
    Timeout {
        /// The per-probe timeout that was exceeded.
        timeout: Duration,
    },
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Unhealthy(_) => "probe_unhealthy",
            ProbeError::Timeout { .. } => "probe_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_error_labels_are_stable() {
        let err = FrameworkError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.as_label(), "circular_dependency");
        assert!(err.as_message().contains("a -> b -> a"));
    }

    #[test]
    fn test_feature_error_retryability() {
        assert!(FeatureError::fail("boom").is_retryable());
        assert!(
            FeatureError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!FeatureError::fatal("nope").is_retryable());
        assert!(!FeatureError::Canceled.is_retryable());
    }

    #[test]
    fn test_missing_dependency_names_both_sides() {
        let err = FrameworkError::MissingDependency {
            feature: "cache".into(),
            dependency: "db".into(),
        };
        let msg = err.as_message();
        assert!(msg.contains("cache"));
        assert!(msg.contains("db"));
    }
}
