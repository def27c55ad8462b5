//! # Fan-out of framework events to subscriber workers.
//!
//! [`SubscriberSet`] hands each subscriber a bounded queue and a dedicated
//! worker task, then feeds every emitted event to all queues with
//! `try_send`. The publisher never waits:
//!
//! - a full or closed queue drops the event for that subscriber only and
//!   publishes `SubscriberOverflow` (overflow events themselves are exempt,
//!   so a drowning subscriber cannot feed back into more overflow traffic);
//! - each worker drains its queue in FIFO order, so a subscriber sees
//!   events in publish order even though subscribers run independently;
//! - there is no ordering *across* subscribers — one may be five events
//!   behind another.
//!
//! Worker panics are confined with `catch_unwind` (via `AssertUnwindSafe`,
//! so a subscriber that panics while holding a shared lock can poison it)
//! and surfaced as `SubscriberPanicked`; the worker then continues.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// The sending half of one subscriber's queue.
struct Outbox {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
}

/// Distributes events to subscriber workers without blocking the emitter.
pub struct SubscriberSet {
    outboxes: Vec<Outbox>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one queue-draining worker per subscriber.
    ///
    /// Queue capacity comes from [`Subscribe::queue_capacity`] (minimum 1);
    /// workers run until [`SubscriberSet::shutdown`] closes the queues.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut outboxes = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            outboxes.push(Outbox {
                name: sub.name(),
                queue: tx,
            });
            workers.push(tokio::spawn(drain_queue(sub, rx, bus.clone())));
        }
        Self {
            outboxes,
            workers,
            bus,
        }
    }

    /// Emits a borrowed event to all subscribers (clones once).
    ///
    /// Prefer [`emit_arc`](Self::emit_arc) on hot paths that already hold
    /// an `Arc<Event>`.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a shared event to all subscribers without waiting.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for outbox in &self.outboxes {
            let dropped = match outbox.queue.try_send(Arc::clone(&event)) {
                Ok(()) => None,
                Err(mpsc::error::TrySendError::Full(_)) => Some("full"),
                Err(mpsc::error::TrySendError::Closed(_)) => Some("closed"),
            };
            if let Some(cause) = dropped {
                if !event.is_subscriber_overflow() {
                    self.bus
                        .publish(Event::subscriber_overflow(outbox.name, cause));
                }
            }
        }
    }

    /// Closes all queues and waits for the workers to finish draining.
    pub async fn shutdown(self) {
        drop(self.outboxes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Worker loop: deliver queued events to one subscriber, isolating panics.
async fn drain_queue(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let delivery = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
            .catch_unwind()
            .await;
        if let Err(payload) = delivery {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_detail(&payload)));
        }
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Counter {
        seen: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _event: &Event) {
            panic!("subscriber blew up");
        }

        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let bus = Bus::new(16);
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let set = SubscriberSet::new(vec![counter.clone() as _], bus);

        set.emit(&Event::new(EventKind::FeatureStarted).with_feature("db"));
        counter.notify.notified().await;
        assert_eq!(counter.seen.load(Ordering::SeqCst), 1);

        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let set = SubscriberSet::new(vec![Arc::new(Panicker) as _, counter.clone() as _], bus);

        set.emit(&Event::new(EventKind::FeatureStarted).with_feature("db"));

        // The healthy subscriber still saw the event.
        counter.notify.notified().await;
        assert_eq!(counter.seen.load(Ordering::SeqCst), 1);

        // The panic surfaced as a SubscriberPanicked event on the bus.
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.feature.as_deref(), Some("panicker"));
        assert!(ev.reason.as_deref().unwrap().contains("blew up"));

        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_reports_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();

        struct Stalled(Notify);

        #[async_trait]
        impl Subscribe for Stalled {
            async fn on_event(&self, _event: &Event) {
                self.0.notified().await;
            }

            fn name(&self) -> &'static str {
                "stalled"
            }

            fn queue_capacity(&self) -> usize {
                1
            }
        }

        let stalled = Arc::new(Stalled(Notify::new()));
        let set = SubscriberSet::new(vec![stalled.clone() as _], bus);

        // One event in flight, one filling the queue, one dropped.
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::ShutdownRequested));
        }
        tokio::task::yield_now().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.feature.as_deref(), Some("stalled"));

        // The worker is still parked in on_event; dropping the set detaches
        // it rather than waiting for a drain that would never finish.
        drop(set);
    }
}
