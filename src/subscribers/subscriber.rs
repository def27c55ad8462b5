//! # Extension point for observing framework events.
//!
//! Implement [`Subscribe`] to ship events somewhere useful — a log, a
//! metrics pipeline, an alerting channel. The fan-out layer
//! ([`SubscriberSet`](crate::subscribers::SubscriberSet)) gives every
//! subscriber its own bounded queue and worker task, so one slow or broken
//! subscriber cannot hold up the framework or its peers.

use async_trait::async_trait;

use crate::events::Event;

/// Receives framework events on a dedicated worker task.
///
/// Delivery contract:
/// - events arrive in publish order, one at a time, per subscriber;
/// - a full queue drops events **for this subscriber only**, reported as
///   `SubscriberOverflow`;
/// - a panic inside [`on_event`](Subscribe::on_event) is caught, reported
///   as `SubscriberPanicked`, and the worker moves on to the next event.
///
/// Keep per-event work small and I/O async — queue capacity is the only
/// slack a slow subscriber gets before events start dropping.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Short name used in logs and in overflow/panic reports.
    ///
    /// The default is `type_name::<Self>()`, which is verbose; override
    /// with something like `"metrics"` or `"audit"`.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue. Clamped to a minimum of 1;
    /// default 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
