//! # Per-topic pub/sub with synchronous, subscription-ordered dispatch.
//!
//! [`TopicBus`] keeps an observer list per event name. Publishing invokes
//! every current subscriber's handler in subscription order, on the
//! publisher's call stack.
//!
//! ## Rules
//! - **Fire-and-forget**: `publish` returns after dispatch; handler results
//!   are not collected.
//! - **Ordering**: handlers run in subscription order, every time.
//! - **Never dropped silently**: all current subscribers are invoked; a
//!   panicking handler is caught, logged, and does not stop the remaining
//!   handlers.
//! - Handlers must be cheap and non-blocking; anything heavy belongs on the
//!   broadcast [`Bus`](crate::events::Bus) behind a subscriber queue.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Handler invoked with the topic name and the published payload.
pub type EventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

struct TopicSubscription {
    owner: Arc<str>,
    handler: EventHandler,
}

/// Observer lists keyed by topic name.
#[derive(Default)]
pub struct TopicBus {
    topics: RwLock<HashMap<String, Vec<TopicSubscription>>>,
}

impl TopicBus {
    /// Creates an empty topic bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `topic` on behalf of `owner`.
    ///
    /// The owner name ties the subscription to a registration so it can be
    /// removed wholesale when the owner unregisters.
    pub fn subscribe(&self, topic: &str, owner: &str, handler: EventHandler) {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_default()
            .push(TopicSubscription {
                owner: Arc::from(owner),
                handler,
            });
    }

    /// Publishes `data` to every subscriber of `topic`, in subscription
    /// order. Returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, data: &Value) -> usize {
        // Handlers are cloned out so a handler that subscribes or publishes
        // re-entrantly cannot deadlock against the topic table.
        let handlers: Vec<(Arc<str>, EventHandler)> = {
            let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
            match topics.get(topic) {
                Some(subs) => subs
                    .iter()
                    .map(|s| (Arc::clone(&s.owner), Arc::clone(&s.handler)))
                    .collect(),
                None => return 0,
            }
        };

        let count = handlers.len();
        for (owner, handler) in handlers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(topic, data)));
            if outcome.is_err() {
                tracing::error!(topic, owner = &*owner, "event handler panicked");
            }
        }
        count
    }

    /// Removes every subscription owned by `owner`.
    pub fn unsubscribe_owner(&self, owner: &str) {
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        for subs in topics.values_mut() {
            subs.retain(|s| &*s.owner != owner);
        }
        topics.retain(|_, subs| !subs.is_empty());
    }
}
