//! # Feature abstraction.
//!
//! This module defines the [`Feature`] trait — the registration contract a
//! unit of application functionality satisfies to be supervised. The common
//! handle type is [`FeatureRef`], an `Arc<dyn Feature>` suitable for sharing
//! across the framework.
//!
//! Every lifecycle method is optional: the defaults make a no-op feature,
//! so implementors only override what they need. The framework never
//! inspects what a feature actually does.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FeatureError;
use crate::linker::EventHandler;

/// Shared handle to a feature instance.
pub type FeatureRef = Arc<dyn Feature>;

/// # A named unit of application work with a supervised lifecycle.
///
/// The manager drives `initialize → start → stop`; the service registry
/// invokes the connection hooks and consumes
/// [`event_subscriptions`](Feature::event_subscriptions) at link time.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use corevisor::{Feature, FeatureError};
///
/// struct Cache;
///
/// #[async_trait]
/// impl Feature for Cache {
///     fn name(&self) -> &str { "cache" }
///
///     async fn start(&self) -> Result<(), FeatureError> {
///         // warm up...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Feature: Send + Sync + 'static {
    /// Returns the stable feature name used for registration, dependency
    /// references, and logs.
    fn name(&self) -> &str;

    /// One-time setup before any start. Defaults to a no-op.
    async fn initialize(&self) -> Result<(), FeatureError> {
        Ok(())
    }

    /// Begins doing work. Called only after every dependency is running.
    /// Defaults to a no-op.
    async fn start(&self) -> Result<(), FeatureError> {
        Ok(())
    }

    /// Stops doing work. Called in reverse dependency order during
    /// shutdown or disable. Defaults to a no-op.
    async fn stop(&self) -> Result<(), FeatureError> {
        Ok(())
    }

    /// Invoked by the service registry when a required capability is wired
    /// to a provider.
    ///
    /// Runs on the registry's call stack during `link()`; store the handle
    /// and return — do not call back into the registry here.
    fn on_connect(&self, _peer: &str, _instance: &FeatureRef) {}

    /// Invoked by the service registry when a wired provider unregisters.
    fn on_disconnect(&self, _peer: &str) {}

    /// Topic subscriptions to install at link time.
    ///
    /// Each entry is `(topic, handler)`; handlers run synchronously in
    /// subscription order and are removed when the feature unregisters.
    fn event_subscriptions(&self) -> Vec<(String, EventHandler)> {
        Vec::new()
    }
}
