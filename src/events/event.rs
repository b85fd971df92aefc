//! # Runtime events emitted by sessions, leader epochs and subscribers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Channel events**: fan-out topic opened/closed, receiver lagged
//! - **Leadership events**: lock requested, withdrawn, acquired, released
//! - **Connection events**: push connection opened, failed, closed, transport errors
//! - **Isolation events**: panicking callbacks/subscribers, subscriber overflow
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! context id, lock/channel names and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use streamvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::LeadershipAcquired)
//!     .with_context(3)
//!     .with_lock("sse-lock")
//!     .with_url("/stream");
//!
//! assert_eq!(ev.kind, EventKind::LeadershipAcquired);
//! assert_eq!(ev.context, Some(3));
//! assert_eq!(ev.lock.as_deref(), Some("sse-lock"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Fan-out channel events ===
    /// A context opened its fan-out channel.
    ///
    /// Sets:
    /// - `context`, `channel`
    ChannelOpened,

    /// A context closed its fan-out channel.
    ///
    /// Sets:
    /// - `context`, `channel`
    ChannelClosed,

    /// A fan-out receiver fell behind and skipped the oldest envelopes.
    ///
    /// Sets:
    /// - `context`, `channel`, `reason`: `skipped=<n>`
    FanoutLagged,

    // === Leadership events ===
    /// A leader epoch started waiting for the lock.
    ///
    /// Sets:
    /// - `context`, `lock`, `url`
    LockRequested,

    /// A pending lock request was withdrawn (teardown before grant).
    ///
    /// Sets:
    /// - `context`, `lock`
    LockWithdrawn,

    /// The lock was granted; this context is now the leader.
    ///
    /// Sets:
    /// - `context`, `lock`, `url`
    LeadershipAcquired,

    /// The leader released the lock.
    ///
    /// Sets:
    /// - `context`, `lock`
    LeadershipReleased,

    // === Connection events ===
    /// The leader opened its push connection and attached listeners.
    ///
    /// Sets:
    /// - `context`, `url`
    ConnectionOpened,

    /// The leader could not open its push connection; the lock is released.
    ///
    /// Sets:
    /// - `context`, `url`, `reason`
    ConnectionFailed,

    /// The leader detached all listeners and closed its push connection.
    ///
    /// Sets:
    /// - `context`, `url`
    ConnectionClosed,

    /// The transport reported a stream error; it reconnects on its own.
    ///
    /// Sets:
    /// - `url`, `reason`
    TransportError,

    // === Callback isolation ===
    /// A user callback panicked while handling an event.
    ///
    /// Sets:
    /// - `context` (when known), `name`: event name, `reason`: panic message
    CallbackPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Id of the context the event belongs to.
    pub context: Option<u64>,
    /// Lock name, for leadership events.
    pub lock: Option<Arc<str>>,
    /// Fan-out channel name, for channel events.
    pub channel: Option<Arc<str>>,
    /// Stream url, for connection events.
    pub url: Option<Arc<str>>,
    /// Event or subscriber name.
    pub name: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            context: None,
            lock: None,
            channel: None,
            url: None,
            name: None,
            reason: None,
        }
    }

    /// Attaches a context id.
    #[inline]
    pub fn with_context(mut self, id: u64) -> Self {
        self.context = Some(id);
        self
    }

    /// Attaches a lock name.
    #[inline]
    pub fn with_lock(mut self, lock: impl Into<Arc<str>>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    /// Attaches a fan-out channel name.
    #[inline]
    pub fn with_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Attaches a stream url.
    #[inline]
    pub fn with_url(mut self, url: impl Into<Arc<str>>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attaches an event or subscriber name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    /// Creates a callback panic event for the named stream event.
    #[inline]
    pub fn callback_panicked(event: &str, info: String) -> Self {
        Event::new(EventKind::CallbackPanicked)
            .with_name(event)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
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

    #[test]
    fn seq_is_strictly_increasing() {
        let a = Event::new(EventKind::ChannelOpened);
        let b = Event::new(EventKind::ChannelClosed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn subscriber_overflow_carries_name_and_reason() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.name.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }

    #[test]
    fn panic_message_handles_str_and_string() {
        let a: Box<dyn std::any::Any + Send> = Box::new("static");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "unknown panic");
    }
}
