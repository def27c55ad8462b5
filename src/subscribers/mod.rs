//! # Event subscribers for the framework.
//!
//! This module provides the [`Subscribe`] trait and the fan-out machinery
//! for handling events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Shape
//! ```text
//! emit(event) ──try_send──► bounded queue ──► worker ──► on_event()
//!                  │              (one queue + worker per subscriber;
//!                  │               a caught panic → SubscriberPanicked)
//!                  └── full/closed → drop + SubscriberOverflow
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use corevisor::{Subscribe, Event, EventKind};
//! use async_trait::async_trait;
//!
//! struct Metrics;
//!
//! #[async_trait]
//! impl Subscribe for Metrics {
//!     async fn on_event(&self, event: &Event) {
//!         if matches!(event.kind, EventKind::FeatureFailed) {
//!             // increment failure counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "metrics" }
//! }
//! ```

mod set;
mod subscriber;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
mod log;
#[cfg(feature = "logging")]
pub use log::LogWriter;
