//! # Broadcast channel for framework events.
//!
//! Every supervision component (feature manager, health monitor, breaker
//! registry, reporter, shutdown coordinator) publishes onto one shared
//! [`Bus`]; listeners subscribe independently and each receives a clone of
//! every event sent after they joined.
//!
//! The bus is deliberately lossy at the edges: publishing with no active
//! receivers discards the event, and a receiver that falls more than the
//! channel capacity behind observes `RecvError::Lagged(n)` and skips the
//! `n` oldest events. Nothing here persists or retries — durability is a
//! subscriber concern.

use tokio::sync::broadcast;

use super::event::Event;

/// Shared, clone-cheap handle onto the framework event channel.
///
/// Backed by [`tokio::sync::broadcast`]: one bounded ring buffer serves
/// all receivers, sends never block, and cloning the bus clones only the
/// sender handle.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus whose ring buffer holds `capacity` events (clamped to
    /// a minimum of 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _initial_rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every active subscriber, without blocking.
    ///
    /// With no subscribers the event is discarded.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Opens an independent receiver observing events published from now
    /// on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::new(EventKind::FeatureStarted).with_feature("db"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::FeatureStarted);
        assert_eq!(ev.feature.as_deref(), Some("db"));
    }

    #[tokio::test]
    async fn test_publish_without_receivers_does_not_panic() {
        let bus = Bus::new(1);
        bus.publish(Event::new(EventKind::ShutdownRequested));
    }

    #[tokio::test]
    async fn test_capacity_clamped_to_one() {
        // Constructing with zero must not panic.
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ShutdownRequested));
        assert!(rx.recv().await.is_ok());
    }
}
