//! # FeatureManager: dependency-ordered lifecycle orchestration.
//!
//! Owns the set of registered features and drives them through
//! `initialize → start → stop`:
//!
//! ```text
//! register(spec) ... register(spec)
//!        │
//!        ▼
//! resolve_order()            topological sort, cycle/missing detection
//!        │
//!        ▼
//! initialize_all()           factory() + initialize(), dependency order;
//!        │                   auto-registers instances into the
//!        │                   ServiceRegistry, then link()
//!        ▼
//! start_all()                start(), dependency order, deps must be
//!        │                   running; critical failure aborts the walk
//!        ▼
//! stop_all()                 stop(), exact reverse order, failures
//!                            logged and tolerated
//! ```
//!
//! ## Rules
//! - A feature cannot be `running` without `initialized`.
//! - A feature starts only when every declared dependency is running;
//!   an unmet dependency skips the feature with a warning, it is not an
//!   error.
//! - A **critical** feature's init/start failure aborts the sequence and
//!   propagates; a non-critical failure is recorded on status and the walk
//!   continues.
//! - Disabling cascades: every enabled transitive dependent is stopped and
//!   disabled first (dependents-first order).
//! - Re-registering a name warns and replaces the spec (never fatal).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{FeatureError, FrameworkError};
use crate::events::{Bus, Event, EventKind};
use crate::features::feature::FeatureRef;
use crate::features::spec::FeatureSpec;
use crate::features::status::{FeatureStatus, HealthSummary, SystemHealth};
use crate::linker::{ServiceMetadata, ServiceRegistry};
use crate::report::{ErrorReporter, FaultContext, FaultKind};

struct FeatureEntry {
    spec: FeatureSpec,
    status: FeatureStatus,
    instance: Option<FeatureRef>,
}

/// Owns feature registration and drives lifecycle transitions.
pub struct FeatureManager {
    bus: Bus,
    reporter: Arc<ErrorReporter>,
    linker: Arc<ServiceRegistry>,
    /// Registration order is preserved; it seeds the deterministic
    /// dependency-order traversal.
    entries: RwLock<Vec<FeatureEntry>>,
}

impl FeatureManager {
    /// Creates an empty manager wired to the bus, reporter, and registry.
    pub fn new(bus: Bus, reporter: Arc<ErrorReporter>, linker: Arc<ServiceRegistry>) -> Self {
        Self {
            bus,
            reporter,
            linker,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Registers a feature specification.
    ///
    /// A duplicate name warns and replaces the previous spec; status and
    /// any live instance are reset.
    pub async fn register(&self, spec: FeatureSpec) {
        let name = spec.name().to_string();
        {
            let mut entries = self.entries.write().await;
            if let Some(existing) = entries.iter_mut().find(|e| e.spec.name() == name) {
                tracing::warn!(feature = name.as_str(), "already registered, replacing");
                existing.spec = spec;
                existing.status = FeatureStatus::new();
                existing.instance = None;
            } else {
                entries.push(FeatureEntry {
                    spec,
                    status: FeatureStatus::new(),
                    instance: None,
                });
            }
        }
        self.bus
            .publish(Event::new(EventKind::FeatureRegistered).with_feature(name));
    }

    /// Resolves the dependency-ordered name list (dependencies first).
    ///
    /// Iterative depth-first traversal with a visiting set; a back edge
    /// yields [`FrameworkError::CircularDependency`] naming the cycle, an
    /// unregistered reference yields [`FrameworkError::MissingDependency`].
    pub async fn resolve_order(&self) -> Result<Vec<String>, FrameworkError> {
        let (names, deps) = {
            let entries = self.entries.read().await;
            let names: Vec<String> = entries.iter().map(|e| e.spec.name().to_string()).collect();
            let deps: HashMap<String, Vec<String>> = entries
                .iter()
                .map(|e| (e.spec.name().to_string(), e.spec.dependencies().to_vec()))
                .collect();
            (names, deps)
        };
        resolve_dependency_order(&names, &deps)
    }

    /// Initializes every enabled feature in dependency order.
    ///
    /// For each: the factory builds the instance, `initialize` runs, and on
    /// success the instance is auto-registered into the service registry
    /// with its capability metadata. After the walk, `link()` recomputes
    /// capability connections.
    pub async fn initialize_all(&self) -> Result<(), FrameworkError> {
        let order = self.resolve_order().await?;

        for name in &order {
            let (spec, skip) = {
                let entries = self.entries.read().await;
                let entry = match entries.iter().find(|e| e.spec.name() == name) {
                    Some(e) => e,
                    None => continue,
                };
                (
                    entry.spec.clone(),
                    !entry.spec.is_enabled() || entry.status.initialized,
                )
            };
            if skip {
                continue;
            }

            let instance = spec.build_instance();
            if instance.name() != name {
                tracing::warn!(
                    feature = name.as_str(),
                    instance = instance.name(),
                    "instance name differs from registered name"
                );
            }

            match instance.initialize().await {
                Ok(()) => {
                    {
                        let mut entries = self.entries.write().await;
                        if let Some(entry) = entries.iter_mut().find(|e| e.spec.name() == name) {
                            entry.status.initialized = true;
                            entry.instance = Some(FeatureRef::clone(&instance));
                        }
                    }
                    self.linker
                        .register(
                            name,
                            instance,
                            ServiceMetadata {
                                kind: spec.kind_name().to_string(),
                                provides: spec.provided().to_vec(),
                                requires: spec.required().to_vec(),
                            },
                        )
                        .await;
                    tracing::debug!(feature = name.as_str(), "initialized");
                }
                Err(err) => {
                    self.reporter
                        .handle(
                            FaultKind::FeatureInit,
                            &err.to_string(),
                            FaultContext::feature(name.clone()),
                        )
                        .await;
                    self.bus.publish(
                        Event::new(EventKind::FeatureFailed)
                            .with_feature(name.clone())
                            .with_reason(err.to_string()),
                    );
                    if spec.is_critical() {
                        return Err(FrameworkError::FeatureInit {
                            feature: name.clone(),
                            source: err,
                        });
                    }
                    let mut entries = self.entries.write().await;
                    if let Some(entry) = entries.iter_mut().find(|e| e.spec.name() == name) {
                        entry.status.record_failure(err.to_string());
                    }
                }
            }
        }

        self.linker.link().await;
        Ok(())
    }

    /// Starts every enabled, auto-start feature in dependency order.
    ///
    /// A feature with an unmet dependency (not running) is skipped with a
    /// warning. A critical feature's failure aborts the walk.
    pub async fn start_all(&self) -> Result<(), FrameworkError> {
        let order = self.resolve_order().await?;

        for name in &order {
            let (eligible, critical, unmet) = {
                let entries = self.entries.read().await;
                let entry = match entries.iter().find(|e| e.spec.name() == name) {
                    Some(e) => e,
                    None => continue,
                };
                let eligible = entry.spec.is_enabled()
                    && entry.spec.is_auto_start()
                    && entry.status.initialized
                    && !entry.status.running;
                let unmet = entry
                    .spec
                    .dependencies()
                    .iter()
                    .find(|dep| {
                        !entries
                            .iter()
                            .any(|e| e.spec.name() == dep.as_str() && e.status.running)
                    })
                    .cloned();
                (eligible, entry.spec.is_critical(), unmet)
            };
            if !eligible {
                continue;
            }
            if let Some(dep) = unmet {
                tracing::warn!(
                    feature = name.as_str(),
                    dependency = dep.as_str(),
                    "dependency not running, skipping start"
                );
                continue;
            }

            if let Err(err) = self.start_entry(name).await {
                if critical {
                    return Err(FrameworkError::FeatureStart {
                        feature: name.clone(),
                        source: err,
                    });
                }
            }
        }
        Ok(())
    }

    /// Stops every running feature in exact reverse dependency order.
    ///
    /// Individual stop failures are logged and tolerated.
    pub async fn stop_all(&self) {
        let order = match self.resolve_order().await {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(error = %err, "dependency order unavailable, stopping in registration order");
                let entries = self.entries.read().await;
                entries.iter().map(|e| e.spec.name().to_string()).collect()
            }
        };

        for name in order.iter().rev() {
            self.stop_entry(name).await;
        }
    }

    /// Re-enables a previously disabled feature.
    ///
    /// The feature is not started automatically; the next `start_all` or an
    /// explicit [`restart_feature`](Self::restart_feature) picks it up.
    pub async fn enable_feature(&self, name: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.spec.name() == name) {
            entry.spec.set_enabled(true);
            tracing::info!(feature = name, "enabled");
        } else {
            tracing::warn!(feature = name, "enable of unknown feature");
        }
    }

    /// Disables a feature, cascading to its enabled dependents.
    ///
    /// Transitive dependents are stopped and disabled first (dependents
    /// before the features they depend on), then the feature itself.
    pub async fn disable_feature(&self, name: &str) {
        let cascade = self.dependent_closure(name).await;
        for dependent in &cascade {
            self.stop_entry(dependent).await;
            self.mark_disabled(dependent, &format!("dependency {name} disabled"))
                .await;
        }

        self.stop_entry(name).await;
        self.mark_disabled(name, "requested").await;
    }

    /// Stops, (re)initializes if needed, and starts a single feature.
    ///
    /// The bounded-restart primitive used by the health monitor's restart
    /// listener. Dependency gating still applies.
    pub async fn restart_feature(&self, name: &str) -> Result<(), FrameworkError> {
        self.stop_entry(name).await;

        let (known, enabled, initialized, unmet) = {
            let entries = self.entries.read().await;
            match entries.iter().find(|e| e.spec.name() == name) {
                None => (false, false, false, None),
                Some(entry) => (
                    true,
                    entry.spec.is_enabled(),
                    entry.status.initialized,
                    entry
                        .spec
                        .dependencies()
                        .iter()
                        .find(|dep| {
                            !entries
                                .iter()
                                .any(|e| e.spec.name() == dep.as_str() && e.status.running)
                        })
                        .cloned(),
                ),
            }
        };
        if !known || !enabled {
            return Err(FrameworkError::FeatureStart {
                feature: name.to_string(),
                source: FeatureError::fail(if known {
                    "feature is disabled"
                } else {
                    "feature is not registered"
                }),
            });
        }

        if !initialized {
            self.initialize_all().await?;
        }
        if let Some(dep) = unmet {
            return Err(FrameworkError::FeatureStart {
                feature: name.to_string(),
                source: FeatureError::fail(format!("dependency {dep:?} not running")),
            });
        }

        self.start_entry(name)
            .await
            .map_err(|err| FrameworkError::FeatureStart {
                feature: name.to_string(),
                source: err,
            })
    }

    /// Unregisters a feature: stops it, removes it from the service
    /// registry, and drops its entry.
    pub async fn unregister_feature(&self, name: &str) {
        self.stop_entry(name).await;
        self.linker.unregister(name).await;
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.spec.name() != name);
    }

    /// Current status of a feature.
    pub async fn status(&self, name: &str) -> Option<FeatureStatus> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|e| e.spec.name() == name)
            .map(|e| e.status.clone())
    }

    /// Registered feature names, in registration order.
    pub async fn feature_names(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries.iter().map(|e| e.spec.name().to_string()).collect()
    }

    /// Aggregates per-feature status into system health.
    ///
    /// Overall `healthy` is `false` only when an enabled **critical**
    /// feature is unhealthy.
    pub async fn system_health(&self) -> SystemHealth {
        let entries = self.entries.read().await;
        let mut summary = HealthSummary {
            total: entries.len(),
            enabled: 0,
            running: 0,
            healthy: 0,
            unhealthy: 0,
        };
        let mut overall = true;

        for entry in entries.iter() {
            if entry.status.running {
                summary.running += 1;
            }
            if !entry.spec.is_enabled() {
                continue;
            }
            summary.enabled += 1;
            if entry.status.healthy {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
                if entry.spec.is_critical() {
                    overall = false;
                }
            }
        }

        SystemHealth {
            healthy: overall,
            summary,
        }
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    /// Starts one initialized feature, updating status and publishing
    /// lifecycle events. Reports failures; the caller decides propagation.
    async fn start_entry(&self, name: &str) -> Result<(), FeatureError> {
        let instance = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .find(|e| e.spec.name() == name)
                .and_then(|e| e.instance.as_ref().map(FeatureRef::clone))
        };
        let Some(instance) = instance else {
            return Err(FeatureError::fail("feature has no live instance"));
        };

        self.bus
            .publish(Event::new(EventKind::FeatureStarting).with_feature(name.to_string()));

        match instance.start().await {
            Ok(()) => {
                let mut entries = self.entries.write().await;
                if let Some(entry) = entries.iter_mut().find(|e| e.spec.name() == name) {
                    entry.status.record_started();
                }
                drop(entries);
                tracing::info!(feature = name, "started");
                self.bus
                    .publish(Event::new(EventKind::FeatureStarted).with_feature(name.to_string()));
                Ok(())
            }
            Err(err) => {
                self.reporter
                    .handle(
                        FaultKind::FeatureStart,
                        &err.to_string(),
                        FaultContext::feature(name.to_string()),
                    )
                    .await;
                {
                    let mut entries = self.entries.write().await;
                    if let Some(entry) = entries.iter_mut().find(|e| e.spec.name() == name) {
                        entry.status.record_failure(err.to_string());
                    }
                }
                self.bus.publish(
                    Event::new(EventKind::FeatureFailed)
                        .with_feature(name.to_string())
                        .with_reason(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Stops one feature if it is running; failures are logged, never
    /// re-thrown.
    async fn stop_entry(&self, name: &str) {
        let instance = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .find(|e| e.spec.name() == name && e.status.running)
                .and_then(|e| e.instance.as_ref().map(FeatureRef::clone))
        };
        let Some(instance) = instance else { return };

        let stop_error = instance.stop().await.err();
        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.iter_mut().find(|e| e.spec.name() == name) {
                entry.status.running = false;
                if let Some(err) = &stop_error {
                    entry.status.error = Some(err.to_string());
                }
            }
        }
        if let Some(err) = stop_error {
            tracing::warn!(feature = name, error = %err, "stop failed, continuing");
        } else {
            tracing::info!(feature = name, "stopped");
        }
        self.bus
            .publish(Event::new(EventKind::FeatureStopped).with_feature(name.to_string()));
    }

    async fn mark_disabled(&self, name: &str, reason: &str) {
        {
            let mut entries = self.entries.write().await;
            match entries.iter_mut().find(|e| e.spec.name() == name) {
                Some(entry) => entry.spec.set_enabled(false),
                None => {
                    tracing::warn!(feature = name, "disable of unknown feature");
                    return;
                }
            }
        }
        self.bus.publish(
            Event::new(EventKind::FeatureDisabled)
                .with_feature(name.to_string())
                .with_reason(reason.to_string()),
        );
    }

    /// Enabled transitive dependents of `name`, ordered dependents-first.
    async fn dependent_closure(&self, name: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut closure: Vec<String> = vec![name.to_string()];
        loop {
            let mut grew = false;
            for entry in entries.iter() {
                let entry_name = entry.spec.name();
                if closure.iter().any(|n| n == entry_name) || !entry.spec.is_enabled() {
                    continue;
                }
                if entry
                    .spec
                    .dependencies()
                    .iter()
                    .any(|dep| closure.iter().any(|n| n == dep))
                {
                    closure.push(entry_name.to_string());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        drop(entries);

        // Dependents-first: reverse dependency order, the seed excluded.
        let order = match self.resolve_order().await {
            Ok(order) => order,
            Err(_) => return closure.into_iter().skip(1).collect(),
        };
        let mut ordered: Vec<String> = order
            .into_iter()
            .filter(|n| n != name && closure.iter().any(|c| c == n))
            .collect();
        ordered.reverse();
        ordered
    }
}

/// Topological sort with cycle naming, over `(names, deps)` adjacency.
fn resolve_dependency_order(
    names: &[String],
    deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, FrameworkError> {
    #[derive(PartialEq, Eq, Clone, Copy)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut order: Vec<String> = Vec::with_capacity(names.len());

    for root in names {
        if marks.contains_key(root) {
            continue;
        }
        let mut stack: Vec<(String, usize)> = vec![(root.clone(), 0)];
        marks.insert(root.clone(), Mark::Visiting);

        while let Some(top) = stack.last_mut() {
            let name = top.0.clone();
            let idx = top.1;
            let Some(name_deps) = deps.get(&name) else {
                stack.pop();
                continue;
            };

            if idx < name_deps.len() {
                top.1 += 1;
                let dep = name_deps[idx].clone();
                if !deps.contains_key(&dep) {
                    return Err(FrameworkError::MissingDependency {
                        feature: name,
                        dependency: dep,
                    });
                }
                match marks.get(&dep) {
                    None => {
                        marks.insert(dep.clone(), Mark::Visiting);
                        stack.push((dep, 0));
                    }
                    Some(Mark::Visiting) => {
                        // Back edge: the cycle is the stack suffix from the
                        // dependency's frame, closed by the dependency.
                        let pos = stack
                            .iter()
                            .position(|(n, _)| n == &dep)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[pos..].iter().map(|(n, _)| n.clone()).collect();
                        cycle.push(dep);
                        return Err(FrameworkError::CircularDependency { cycle });
                    }
                    Some(Mark::Done) => {}
                }
            } else {
                marks.insert(name.clone(), Mark::Done);
                order.push(name);
                stack.pop();
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakers::CircuitBreakerRegistry;
    use crate::config::BreakerConfig;
    use crate::features::feature::Feature;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Test feature recording lifecycle calls into a shared journal.
    struct Recorder {
        name: String,
        journal: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
        fail_start: bool,
        fail_stop: bool,
    }

    impl Recorder {
        fn spec(
            name: &str,
            journal: &Arc<Mutex<Vec<String>>>,
        ) -> (FeatureSpec, Arc<Mutex<Vec<String>>>) {
            let journal = Arc::clone(journal);
            let name_owned = name.to_string();
            let journal_in_factory = Arc::clone(&journal);
            let spec = FeatureSpec::new(name, move || {
                Arc::new(Recorder {
                    name: name_owned.clone(),
                    journal: Arc::clone(&journal_in_factory),
                    fail_init: false,
                    fail_start: false,
                    fail_stop: false,
                })
            });
            (spec, journal)
        }

        fn failing_start_spec(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> FeatureSpec {
            let journal = Arc::clone(journal);
            let name_owned = name.to_string();
            FeatureSpec::new(name, move || {
                Arc::new(Recorder {
                    name: name_owned.clone(),
                    journal: Arc::clone(&journal),
                    fail_init: false,
                    fail_start: true,
                    fail_stop: false,
                })
            })
        }

        fn failing_init_spec(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> FeatureSpec {
            let journal = Arc::clone(journal);
            let name_owned = name.to_string();
            FeatureSpec::new(name, move || {
                Arc::new(Recorder {
                    name: name_owned.clone(),
                    journal: Arc::clone(&journal),
                    fail_init: true,
                    fail_start: false,
                    fail_stop: false,
                })
            })
        }
    }

    #[async_trait]
    impl Feature for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn initialize(&self) -> Result<(), FeatureError> {
            self.journal.lock().unwrap().push(format!("init:{}", self.name));
            if self.fail_init {
                return Err(FeatureError::fail("init refused"));
            }
            Ok(())
        }

        async fn start(&self) -> Result<(), FeatureError> {
            self.journal.lock().unwrap().push(format!("start:{}", self.name));
            if self.fail_start {
                return Err(FeatureError::fail("start refused"));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), FeatureError> {
            self.journal.lock().unwrap().push(format!("stop:{}", self.name));
            if self.fail_stop {
                return Err(FeatureError::fail("stop refused"));
            }
            Ok(())
        }
    }

    fn manager() -> FeatureManager {
        let bus = Bus::new(256);
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            BreakerConfig::default(),
            bus.clone(),
        ));
        let reporter = Arc::new(ErrorReporter::new(bus.clone(), breakers));
        let linker = Arc::new(ServiceRegistry::new(bus.clone()));
        FeatureManager::new(bus, reporter, linker)
    }

    #[tokio::test]
    async fn test_dependency_order_places_dependencies_first() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        // A requires B, B requires C, C requires nothing.
        let (spec_a, _) = Recorder::spec("a", &journal);
        let (spec_b, _) = Recorder::spec("b", &journal);
        let (spec_c, _) = Recorder::spec("c", &journal);
        mgr.register(spec_a.depends_on("b")).await;
        mgr.register(spec_b.depends_on("c")).await;
        mgr.register(spec_c).await;

        let order = mgr.resolve_order().await.unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_cycle_detection_names_the_cycle() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec_a, _) = Recorder::spec("a", &journal);
        let (spec_b, _) = Recorder::spec("b", &journal);
        mgr.register(spec_a.depends_on("b")).await;
        mgr.register(spec_b.depends_on("a")).await;

        match mgr.resolve_order().await {
            Err(FrameworkError::CircularDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_dependency_is_detected() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec, _) = Recorder::spec("api", &journal);
        mgr.register(spec.depends_on("ghost")).await;

        match mgr.resolve_order().await {
            Err(FrameworkError::MissingDependency {
                feature,
                dependency,
            }) => {
                assert_eq!(feature, "api");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected MissingDependency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_walk_and_reverse_stop_order() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec_db, _) = Recorder::spec("db", &journal);
        let (spec_cache, _) = Recorder::spec("cache", &journal);
        mgr.register(spec_db).await;
        mgr.register(spec_cache.depends_on("db")).await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();
        mgr.stop_all().await;

        let journal = journal.lock().unwrap();
        assert_eq!(
            *journal,
            vec![
                "init:db",
                "init:cache",
                "start:db",
                "start:cache",
                "stop:cache",
                "stop:db"
            ]
        );
    }

    #[tokio::test]
    async fn test_critical_start_failure_aborts_walk() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        mgr.register(Recorder::failing_start_spec("db", &journal).critical(true))
            .await;
        let (spec_cache, _) = Recorder::spec("cache", &journal);
        mgr.register(spec_cache.depends_on("db")).await;

        mgr.initialize_all().await.unwrap();
        let err = mgr.start_all().await.unwrap_err();
        assert!(matches!(err, FrameworkError::FeatureStart { .. }));

        // cache never started.
        assert!(!journal.lock().unwrap().contains(&"start:cache".to_string()));
    }

    #[tokio::test]
    async fn test_non_critical_failure_degrades_and_continues() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        mgr.register(Recorder::failing_start_spec("metrics", &journal))
            .await;
        let (spec_api, _) = Recorder::spec("api", &journal);
        mgr.register(spec_api).await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();

        let metrics = mgr.status("metrics").await.unwrap();
        assert!(!metrics.healthy);
        assert!(!metrics.running);
        assert_eq!(metrics.error.as_deref(), Some("start refused"));

        let api = mgr.status("api").await.unwrap();
        assert!(api.running);

        let health = mgr.system_health().await;
        assert!(health.healthy, "non-critical failure keeps system healthy");
        assert_eq!(health.summary.unhealthy, 1);
    }

    #[tokio::test]
    async fn test_critical_init_failure_aborts_initialize_all() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        mgr.register(Recorder::failing_init_spec("db", &journal).critical(true))
            .await;

        let err = mgr.initialize_all().await.unwrap_err();
        assert!(matches!(err, FrameworkError::FeatureInit { .. }));
    }

    #[tokio::test]
    async fn test_disabled_dependency_skips_dependent_start() {
        // The end-to-end scenario: db critical, cache non-critical
        // requiring db; db disabled before start.
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec_db, _) = Recorder::spec("db", &journal);
        let (spec_cache, _) = Recorder::spec("cache", &journal);
        mgr.register(spec_db.critical(true)).await;
        mgr.register(spec_cache.depends_on("db")).await;
        mgr.disable_feature("db").await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();

        let cache = mgr.status("cache").await.unwrap();
        assert!(!cache.running, "cache must not start without db");
        assert!(cache.healthy);

        // A disabled critical feature is deliberately off, not unhealthy.
        let health = mgr.system_health().await;
        assert!(health.healthy);
        assert_eq!(health.summary.running, 0);
    }

    #[tokio::test]
    async fn test_disable_cascades_to_dependents() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec_db, _) = Recorder::spec("db", &journal);
        let (spec_cache, _) = Recorder::spec("cache", &journal);
        let (spec_api, _) = Recorder::spec("api", &journal);
        mgr.register(spec_db).await;
        mgr.register(spec_cache.depends_on("db")).await;
        mgr.register(spec_api.depends_on("cache")).await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();
        journal.lock().unwrap().clear();

        mgr.disable_feature("db").await;

        // Dependents stop first, in reverse dependency order.
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["stop:api", "stop:cache", "stop:db"]
        );
        for name in ["db", "cache", "api"] {
            let status = mgr.status(name).await.unwrap();
            assert!(!status.running, "{name} should be stopped");
        }
    }

    #[tokio::test]
    async fn test_stop_failure_is_tolerated() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let journal_in_factory = Arc::clone(&journal);
        mgr.register(FeatureSpec::new("stubborn", move || {
            Arc::new(Recorder {
                name: "stubborn".into(),
                journal: Arc::clone(&journal_in_factory),
                fail_init: false,
                fail_start: false,
                fail_stop: true,
            })
        }))
        .await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();
        mgr.stop_all().await;

        let status = mgr.status("stubborn").await.unwrap();
        assert!(!status.running);
        assert_eq!(status.error.as_deref(), Some("stop refused"));
    }

    #[tokio::test]
    async fn test_restart_feature_stops_then_starts() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec, _) = Recorder::spec("worker", &journal);
        mgr.register(spec).await;
        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();
        journal.lock().unwrap().clear();

        mgr.restart_feature("worker").await.unwrap();

        assert_eq!(*journal.lock().unwrap(), vec!["stop:worker", "start:worker"]);
        assert!(mgr.status("worker").await.unwrap().running);
    }

    #[tokio::test]
    async fn test_enable_after_disable_allows_restart() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec, _) = Recorder::spec("worker", &journal);
        mgr.register(spec).await;
        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();

        mgr.disable_feature("worker").await;
        assert!(!mgr.status("worker").await.unwrap().running);

        // Disabled features refuse explicit restarts.
        assert!(mgr.restart_feature("worker").await.is_err());

        mgr.enable_feature("worker").await;
        mgr.restart_feature("worker").await.unwrap();
        assert!(mgr.status("worker").await.unwrap().running);
    }

    #[tokio::test]
    async fn test_spec_of_instance_reuses_the_handle() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let instance: Arc<Recorder> = Arc::new(Recorder {
            name: "shared".into(),
            journal: Arc::clone(&journal),
            fail_init: false,
            fail_start: false,
            fail_stop: false,
        });
        mgr.register(FeatureSpec::of_instance("shared", instance.clone()))
            .await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();

        // The registered handle is the caller's instance, not a copy.
        assert!(Arc::strong_count(&instance) > 1);
        assert!(mgr.status("shared").await.unwrap().running);
    }

    #[tokio::test]
    async fn test_restart_unknown_feature_errors() {
        let mgr = manager();
        let err = mgr.restart_feature("ghost").await.unwrap_err();
        assert!(matches!(err, FrameworkError::FeatureStart { .. }));
    }

    #[tokio::test]
    async fn test_reregistration_replaces_spec() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec_one, _) = Recorder::spec("db", &journal);
        mgr.register(spec_one).await;
        let (spec_two, _) = Recorder::spec("db", &journal);
        mgr.register(spec_two.critical(true)).await;

        assert_eq!(mgr.feature_names().await, vec!["db"]);
    }

    #[tokio::test]
    async fn test_auto_start_false_is_skipped_by_start_all() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec, _) = Recorder::spec("manual", &journal);
        mgr.register(spec.auto_start(false)).await;

        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();
        assert!(!mgr.status("manual").await.unwrap().running);

        // Explicit restart starts it.
        mgr.restart_feature("manual").await.unwrap();
        assert!(mgr.status("manual").await.unwrap().running);
    }

    #[tokio::test]
    async fn test_initialized_features_are_linked_by_capability() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        let (spec_db, _) = Recorder::spec("db", &journal);
        let (spec_api, _) = Recorder::spec("api", &journal);
        mgr.register(spec_db.provides("sql")).await;
        mgr.register(spec_api.requires("sql")).await;

        mgr.initialize_all().await.unwrap();

        let conns = mgr.linker.connections().await;
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].from, "api");
        assert_eq!(conns[0].to, "db");
    }

    #[tokio::test]
    async fn test_running_requires_initialized() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));

        mgr.register(Recorder::failing_init_spec("broken", &journal))
            .await;
        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();

        let status = mgr.status("broken").await.unwrap();
        assert!(!status.initialized);
        assert!(!status.running, "running implies initialized");
    }

    // Verify that registering from an event listener cannot deadlock the
    // entry table (locks are never held across lifecycle awaits).
    #[tokio::test]
    async fn test_status_reads_during_walk() {
        let mgr = Arc::new(manager());
        let journal = Arc::new(Mutex::new(Vec::new()));
        let (spec, _) = Recorder::spec("db", &journal);
        mgr.register(spec).await;
        mgr.initialize_all().await.unwrap();

        let reader = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.system_health().await })
        };
        mgr.start_all().await.unwrap();
        let health = reader.await.unwrap();
        assert!(health.healthy);
    }

    #[tokio::test]
    async fn test_unregister_removes_everywhere() {
        let mgr = manager();
        let journal = Arc::new(Mutex::new(Vec::new()));
        let (spec, _) = Recorder::spec("db", &journal);
        mgr.register(spec.provides("sql")).await;
        mgr.initialize_all().await.unwrap();
        mgr.start_all().await.unwrap();

        mgr.unregister_feature("db").await;

        assert!(mgr.feature_names().await.is_empty());
        assert!(mgr.linker.discover("db").await.is_none());
        assert!(journal.lock().unwrap().contains(&"stop:db".to_string()));
    }
}
