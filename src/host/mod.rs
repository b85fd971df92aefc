//! Host capabilities shared by all contexts of an origin.
//!
//! Leader election uses two separate coordination primitives; leadership never
//! depends on message delivery.
//!
//! - [`LockService`] / [`LocalLocks`]: named mutual exclusion
//! - [`BroadcastService`] / [`LocalBroadcast`]: named pub/sub topics

mod broadcast;
mod locks;

pub use broadcast::{BroadcastService, Envelope, LocalBroadcast};
pub use locks::{Lease, LocalLocks, LockService};
