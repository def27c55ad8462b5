//! Framework events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the supervision components.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — event classification and payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `FeatureManager`, `HealthMonitor`,
//!   `CircuitBreakerRegistry`, `ErrorReporter`, `ShutdownCoordinator`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the context's subscriber listener (fans out to
//!   [`SubscriberSet`](crate::subscribers::SubscriberSet)), the shutdown
//!   coordinator's fatal-fault listener, and the context's restart listener.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
