//! Service registry: discovery, capability wiring, pub/sub, shared state.
//!
//! ## Contents
//! - [`ServiceRegistry`] — registrations, derived connections, discovery,
//!   shared key/value state
//! - [`ServiceMetadata`], [`Connection`] — the capability data model
//! - [`TopicBus`], [`EventHandler`] — per-topic synchronous pub/sub
//!
//! ## Quick wiring
//! ```text
//! FeatureManager::initialize_all()
//!   └─► register(name, instance, metadata)   (one per initialized feature)
//!   └─► link()   (recompute requires × provides, on_connect, topics)
//! ```

mod pubsub;
mod registry;

pub use pubsub::{EventHandler, TopicBus};
pub use registry::{Connection, ServiceMetadata, ServiceRegistry};
