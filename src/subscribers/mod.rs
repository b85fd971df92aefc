//! # Runtime-event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the optional built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Session/Leader ── publish(Event) ──► Bus ──► Origin listener ──► SubscriberSet
//!                                                                       │
//!                                                     ┌─────────────────┼──────────┐
//!                                                     ▼                 ▼          ▼
//!                                                 LogWriter          Metrics    Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use streamvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct LeaderGauge;
//!
//! #[async_trait]
//! impl Subscribe for LeaderGauge {
//!     async fn on_event(&self, event: &Event) {
//!         match event.kind {
//!             EventKind::LeadershipAcquired => { /* gauge = 1 */ }
//!             EventKind::LeadershipReleased => { /* gauge = 0 */ }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
