//! # Feature specification for supervised lifecycle management.
//!
//! Defines [`FeatureSpec`] — the registration bundle describing how a
//! feature participates in supervision: its factory, criticality,
//! dependencies, and capability metadata.
//!
//! The instance itself is created lazily by the factory during
//! `initialize_all`, so registering a feature is cheap and side-effect
//! free.

use std::sync::Arc;

use crate::features::feature::FeatureRef;

/// Factory producing the feature instance at initialization time.
pub type FeatureFactory = Arc<dyn Fn() -> FeatureRef + Send + Sync>;

/// Specification for running a feature under supervision.
///
/// Built with [`FeatureSpec::new`] plus builder-style `with_*` methods.
///
/// ## Example
/// ```rust
/// use corevisor::{Feature, FeatureSpec};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Db;
///
/// #[async_trait]
/// impl Feature for Db {
///     fn name(&self) -> &str { "db" }
/// }
///
/// let spec = FeatureSpec::new("db", || Arc::new(Db))
///     .critical(true)
///     .provides("sql");
/// assert!(spec.is_critical());
/// ```
#[derive(Clone)]
pub struct FeatureSpec {
    name: String,
    factory: FeatureFactory,
    enabled: bool,
    critical: bool,
    auto_start: bool,
    dependencies: Vec<String>,
    kind: String,
    provides: Vec<String>,
    requires: Vec<String>,
}

impl FeatureSpec {
    /// Creates a specification with defaults: enabled, non-critical,
    /// auto-start, no dependencies, kind `"feature"`.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> FeatureRef + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            enabled: true,
            critical: false,
            auto_start: true,
            dependencies: Vec::new(),
            kind: "feature".to_string(),
            provides: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Wraps an already-constructed instance; the factory clones the handle.
    pub fn of_instance(name: impl Into<String>, instance: FeatureRef) -> Self {
        Self::new(name, move || FeatureRef::clone(&instance))
    }

    /// Sets whether the feature participates in lifecycle walks.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Marks the feature critical: its init/start failure aborts startup,
    /// and its unhealthiness makes the whole system unhealthy.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Controls participation in `start_all` (a non-auto-start feature is
    /// only started explicitly).
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Declares a lifecycle dependency: the named feature must be running
    /// before this one starts.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Sets the discovery kind (default `"feature"`).
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Declares a capability this feature provides (for link-time wiring).
    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        self.provides.push(capability.into());
        self
    }

    /// Declares a capability this feature requires (for link-time wiring).
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires.push(capability.into());
        self
    }

    /// The registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the feature is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the feature is critical.
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Whether `start_all` starts this feature.
    pub fn is_auto_start(&self) -> bool {
        self.auto_start
    }

    /// Declared lifecycle dependencies.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The discovery kind.
    pub fn kind_name(&self) -> &str {
        &self.kind
    }

    /// Provided capabilities.
    pub fn provided(&self) -> &[String] {
        &self.provides
    }

    /// Required capabilities.
    pub fn required(&self) -> &[String] {
        &self.requires
    }

    pub(crate) fn build_instance(&self) -> FeatureRef {
        (self.factory)()
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl std::fmt::Debug for FeatureSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureSpec")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("critical", &self.critical)
            .field("auto_start", &self.auto_start)
            .field("dependencies", &self.dependencies)
            .field("kind", &self.kind)
            .field("provides", &self.provides)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}
