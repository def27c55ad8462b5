//! # ServiceRegistry: registration, discovery, capability wiring, state.
//!
//! The registry owns three related tables:
//!
//! - **registrations** — named instances with capability metadata
//!   (`kind`, `provides`, `requires`);
//! - **connections** — directed edges derived by [`ServiceRegistry::link`]:
//!   one edge per `requires`-capability matched against another
//!   registration's `provides`. Connections are recomputed, never edited;
//! - **shared state** — an opaque key/value map whose writes publish
//!   `state.changed`.
//!
//! ## Rules
//! - Registering an existing name warns and replaces (never fatal).
//! - Unregistering removes every connection touching the name and notifies
//!   affected requirers via `on_disconnect`.
//! - Unmet requirements are logged, not failed — degraded wiring is a
//!   legitimate state.
//! - Discovery methods are pure lookups with no side effects.

use std::collections::HashSet;
use std::time::SystemTime;

use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::events::{Bus, Event, EventKind};
use crate::features::FeatureRef;
use crate::linker::pubsub::{EventHandler, TopicBus};

/// Capability metadata attached to a registration.
#[derive(Debug, Clone, Default)]
pub struct ServiceMetadata {
    /// Coarse classification used by [`ServiceRegistry::discover_by_kind`].
    pub kind: String,
    /// Capabilities this instance offers to others.
    pub provides: Vec<String>,
    /// Capabilities this instance needs from others.
    pub requires: Vec<String>,
}

impl ServiceMetadata {
    /// Metadata with a kind and no capabilities.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Adds a provided capability.
    pub fn provides(mut self, capability: impl Into<String>) -> Self {
        self.provides.push(capability.into());
        self
    }

    /// Adds a required capability.
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires.push(capability.into());
        self
    }
}

/// A directed capability edge: `from` requires something `to` provides.
#[derive(Debug, Clone)]
pub struct Connection {
    /// The requirer.
    pub from: String,
    /// The provider.
    pub to: String,
    /// The capability that matched.
    pub capability: String,
    /// When the edge was (re)established.
    pub established_at: SystemTime,
}

struct Registration {
    name: String,
    instance: FeatureRef,
    metadata: ServiceMetadata,
    registered_at: SystemTime,
    /// Event subscriptions are consumed once, on the first link after
    /// registration.
    wired: bool,
}

/// Registration, discovery, capability wiring, pub/sub, and shared state.
pub struct ServiceRegistry {
    bus: Bus,
    topics: TopicBus,
    registrations: RwLock<Vec<Registration>>,
    connections: RwLock<Vec<Connection>>,
    state: RwLock<std::collections::HashMap<String, Value>>,
}

impl ServiceRegistry {
    /// Creates an empty registry publishing framework events to `bus`.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            topics: TopicBus::new(),
            registrations: RwLock::new(Vec::new()),
            connections: RwLock::new(Vec::new()),
            state: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Registers `instance` under `name` with capability metadata.
    ///
    /// An existing name warns and is replaced; its old subscriptions and
    /// connections are dropped until the next [`link`](Self::link).
    pub async fn register(&self, name: &str, instance: FeatureRef, metadata: ServiceMetadata) {
        {
            let mut regs = self.registrations.write().await;
            if let Some(existing) = regs.iter_mut().find(|r| r.name == name) {
                tracing::warn!(service = name, "already registered, replacing");
                self.topics.unsubscribe_owner(name);
                existing.instance = instance;
                existing.metadata = metadata;
                existing.registered_at = SystemTime::now();
                existing.wired = false;
            } else {
                regs.push(Registration {
                    name: name.to_string(),
                    instance,
                    metadata,
                    registered_at: SystemTime::now(),
                    wired: false,
                });
            }
        }
        self.prune_connections(name).await;
        tracing::debug!(service = name, "registered");
    }

    /// Unregisters `name`, removing every connection touching it.
    ///
    /// Requirers that were wired to the departing provider receive
    /// `on_disconnect`. Unknown names are a logged no-op.
    pub async fn unregister(&self, name: &str) {
        let removed = {
            let mut regs = self.registrations.write().await;
            let before = regs.len();
            regs.retain(|r| r.name != name);
            before != regs.len()
        };
        if !removed {
            tracing::warn!(service = name, "unregister of unknown service");
            return;
        }

        self.topics.unsubscribe_owner(name);

        // Notify requirers that lost their provider.
        let orphaned: Vec<String> = {
            let mut conns = self.connections.write().await;
            let orphaned = conns
                .iter()
                .filter(|c| c.to == name)
                .map(|c| c.from.clone())
                .collect();
            conns.retain(|c| c.from != name && c.to != name);
            orphaned
        };
        let regs = self.registrations.read().await;
        for requirer in orphaned {
            if let Some(reg) = regs.iter().find(|r| r.name == requirer) {
                reg.instance.on_disconnect(name);
            }
        }
        tracing::debug!(service = name, "unregistered");
    }

    /// Name and registration time of every entry, in registration order.
    pub async fn registrations(&self) -> Vec<(String, SystemTime)> {
        let regs = self.registrations.read().await;
        regs.iter()
            .map(|r| (r.name.clone(), r.registered_at))
            .collect()
    }

    /// Looks up a single registration by name.
    pub async fn discover(&self, name: &str) -> Option<FeatureRef> {
        let regs = self.registrations.read().await;
        regs.iter()
            .find(|r| r.name == name)
            .map(|r| FeatureRef::clone(&r.instance))
    }

    /// Returns every registration of the given kind, in registration order.
    pub async fn discover_by_kind(&self, kind: &str) -> Vec<(String, FeatureRef)> {
        let regs = self.registrations.read().await;
        regs.iter()
            .filter(|r| r.metadata.kind == kind)
            .map(|r| (r.name.clone(), FeatureRef::clone(&r.instance)))
            .collect()
    }

    /// Returns every registration providing the given capability, in
    /// registration order.
    pub async fn discover_by_capability(&self, capability: &str) -> Vec<(String, FeatureRef)> {
        let regs = self.registrations.read().await;
        regs.iter()
            .filter(|r| r.metadata.provides.iter().any(|c| c == capability))
            .map(|r| (r.name.clone(), FeatureRef::clone(&r.instance)))
            .collect()
    }

    /// Recomputes capability connections across all registrations.
    ///
    /// For every registration, each required capability is matched against
    /// the other registrations' `provides`. New edges fire the requirer's
    /// `on_connect`; unmet requirements are logged. Event subscriptions of
    /// not-yet-wired registrations are consumed here.
    pub async fn link(&self) {
        let mut regs = self.registrations.write().await;

        // Consume pending event subscriptions first.
        for reg in regs.iter_mut().filter(|r| !r.wired) {
            for (topic, handler) in reg.instance.event_subscriptions() {
                self.topics.subscribe(&topic, &reg.name, handler);
            }
            reg.wired = true;
        }

        let previous: HashSet<(String, String, String)> = {
            let conns = self.connections.read().await;
            conns
                .iter()
                .map(|c| (c.from.clone(), c.to.clone(), c.capability.clone()))
                .collect()
        };

        let mut next: Vec<Connection> = Vec::new();
        for requirer in regs.iter() {
            for capability in &requirer.metadata.requires {
                let providers: Vec<&Registration> = regs
                    .iter()
                    .filter(|r| {
                        r.name != requirer.name
                            && r.metadata.provides.iter().any(|c| c == capability)
                    })
                    .collect();

                if providers.is_empty() {
                    tracing::warn!(
                        service = requirer.name.as_str(),
                        capability = capability.as_str(),
                        "requirement unmet"
                    );
                    continue;
                }

                for provider in providers {
                    let key = (
                        requirer.name.clone(),
                        provider.name.clone(),
                        capability.clone(),
                    );
                    if !previous.contains(&key) {
                        requirer
                            .instance
                            .on_connect(&provider.name, &provider.instance);
                        tracing::debug!(
                            from = requirer.name.as_str(),
                            to = provider.name.as_str(),
                            capability = capability.as_str(),
                            "connected"
                        );
                    }
                    next.push(Connection {
                        from: requirer.name.clone(),
                        to: provider.name.clone(),
                        capability: capability.clone(),
                        established_at: SystemTime::now(),
                    });
                }
            }
        }

        *self.connections.write().await = next;
    }

    /// Current connection set (derived; order follows requirer registration
    /// order).
    pub async fn connections(&self) -> Vec<Connection> {
        self.connections.read().await.clone()
    }

    /// Subscribes a handler to a topic on behalf of `owner`.
    pub fn subscribe(&self, topic: &str, owner: &str, handler: EventHandler) {
        self.topics.subscribe(topic, owner, handler);
    }

    /// Publishes `data` to every current subscriber of `topic`.
    ///
    /// Fire-and-forget; returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, data: &Value) -> usize {
        self.topics.publish(topic, data)
    }

    /// Reads a shared-state value.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.read().await.get(key).cloned()
    }

    /// Writes a shared-state value (last-writer-wins).
    ///
    /// Publishes a `state.changed` topic event carrying
    /// `{key, old, new}` and a `StateChanged` bus event.
    pub async fn set(&self, key: &str, value: Value) {
        let old = {
            let mut state = self.state.write().await;
            state.insert(key.to_string(), value.clone())
        };

        self.bus
            .publish(Event::new(EventKind::StateChanged).with_key(key));
        self.topics.publish(
            "state.changed",
            &json!({
                "key": key,
                "old": old.unwrap_or(Value::Null),
                "new": value,
            }),
        );
    }

    /// Drops connections touching `name` (used when a name is re-registered
    /// so stale edges cannot outlive the metadata that derived them).
    async fn prune_connections(&self, name: &str) {
        let mut conns = self.connections.write().await;
        conns.retain(|c| c.from != name && c.to != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Plain(&'static str);

    #[async_trait]
    impl Feature for Plain {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[derive(Default)]
    struct PeerLog {
        connected: Mutex<Vec<String>>,
        disconnected: Mutex<Vec<String>>,
    }

    struct Watcher {
        name: &'static str,
        log: Arc<PeerLog>,
    }

    #[async_trait]
    impl Feature for Watcher {
        fn name(&self) -> &str {
            self.name
        }

        fn on_connect(&self, peer: &str, _instance: &FeatureRef) {
            self.log.connected.lock().unwrap().push(peer.to_string());
        }

        fn on_disconnect(&self, peer: &str) {
            self.log.disconnected.lock().unwrap().push(peer.to_string());
        }
    }

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(Bus::new(64))
    }

    #[tokio::test]
    async fn test_registrations_preserve_order_and_time() {
        let reg = registry();
        let before = SystemTime::now();
        reg.register("db", Arc::new(Plain("db")), ServiceMetadata::default())
            .await;
        reg.register("cache", Arc::new(Plain("cache")), ServiceMetadata::default())
            .await;

        let listed = reg.registrations().await;
        let names: Vec<&str> = listed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["db", "cache"]);
        assert!(listed.iter().all(|(_, at)| *at >= before));
    }

    #[tokio::test]
    async fn test_discovery_lookups() {
        let reg = registry();
        reg.register(
            "db",
            Arc::new(Plain("db")),
            ServiceMetadata::of_kind("storage").provides("sql"),
        )
        .await;
        reg.register(
            "cache",
            Arc::new(Plain("cache")),
            ServiceMetadata::of_kind("storage").provides("kv"),
        )
        .await;

        assert!(reg.discover("db").await.is_some());
        assert!(reg.discover("missing").await.is_none());
        assert_eq!(reg.discover_by_kind("storage").await.len(), 2);
        let sql = reg.discover_by_capability("sql").await;
        assert_eq!(sql.len(), 1);
        assert_eq!(sql[0].0, "db");
    }

    #[tokio::test]
    async fn test_link_connects_requirer_to_provider() {
        let reg = registry();
        let log = Arc::new(PeerLog::default());

        reg.register(
            "db",
            Arc::new(Plain("db")),
            ServiceMetadata::of_kind("storage").provides("sql"),
        )
        .await;
        reg.register(
            "api",
            Arc::new(Watcher {
                name: "api",
                log: Arc::clone(&log),
            }),
            ServiceMetadata::of_kind("surface").requires("sql"),
        )
        .await;

        reg.link().await;

        let conns = reg.connections().await;
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].from, "api");
        assert_eq!(conns[0].to, "db");
        assert_eq!(conns[0].capability, "sql");
        assert_eq!(*log.connected.lock().unwrap(), vec!["db"]);

        // Re-linking does not re-fire on_connect for existing edges.
        reg.link().await;
        assert_eq!(log.connected.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmet_requirement_logs_but_does_not_fail() {
        let reg = registry();
        reg.register(
            "api",
            Arc::new(Plain("api")),
            ServiceMetadata::of_kind("surface").requires("sql"),
        )
        .await;

        reg.link().await;
        assert!(reg.connections().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_removes_connections_and_notifies() {
        let reg = registry();
        let log = Arc::new(PeerLog::default());

        reg.register(
            "db",
            Arc::new(Plain("db")),
            ServiceMetadata::of_kind("storage").provides("sql"),
        )
        .await;
        reg.register(
            "api",
            Arc::new(Watcher {
                name: "api",
                log: Arc::clone(&log),
            }),
            ServiceMetadata::of_kind("surface").requires("sql"),
        )
        .await;
        reg.link().await;

        reg.unregister("db").await;

        assert!(reg.connections().await.is_empty());
        assert_eq!(*log.disconnected.lock().unwrap(), vec!["db"]);
        assert!(reg.discover("db").await.is_none());
    }

    #[tokio::test]
    async fn test_set_publishes_state_changed_with_old_and_new() {
        let reg = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_in_handler = Arc::clone(&seen);
        reg.subscribe(
            "state.changed",
            "test",
            Arc::new(move |_, data| {
                seen_in_handler.lock().unwrap().push(data.clone());
            }),
        );

        reg.set("mode", serde_json::json!("active")).await;
        reg.set("mode", serde_json::json!("draining")).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["key"], "mode");
        assert_eq!(seen[0]["old"], Value::Null);
        assert_eq!(seen[0]["new"], "active");
        assert_eq!(seen[1]["old"], "active");
        assert_eq!(seen[1]["new"], "draining");

        assert_eq!(reg.get("mode").await, Some(serde_json::json!("draining")));
    }

    #[tokio::test]
    async fn test_reregistration_replaces_and_warns_only() {
        let reg = registry();
        reg.register(
            "db",
            Arc::new(Plain("db")),
            ServiceMetadata::of_kind("storage").provides("sql"),
        )
        .await;
        reg.register(
            "db",
            Arc::new(Plain("db")),
            ServiceMetadata::of_kind("storage").provides("kv"),
        )
        .await;

        assert!(reg.discover_by_capability("sql").await.is_empty());
        assert_eq!(reg.discover_by_capability("kv").await.len(), 1);
    }
}
