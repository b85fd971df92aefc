//! # Configuration.
//!
//! Two layers:
//! 1. [`Config`]: origin-wide runtime settings (queues, reconnect policy),
//!    given to [`Origin::builder`](crate::Origin::builder).
//! 2. [`SessionConfig`]: what one session connects to and listens for, given to
//!    [`Context::mount`](crate::Context::mount) and
//!    [`Session::reconcile`](crate::Session::reconcile).
//!
//! ## Sentinel values
//! - capacities of `0` are clamped to `1` by the accessors
//! - `ReconnectPolicy::factor = 0` is treated as `1` (constant delay)

use std::time::Duration;

use crate::bindings::EventBindings;
use crate::transport::TransportOptions;

/// Default fan-out channel name.
pub const DEFAULT_CHANNEL_NAME: &str = "sse-channel";

/// Default lock name.
pub const DEFAULT_LOCK_NAME: &str = "sse-lock";

/// Origin-wide runtime configuration.
///
/// ## Field semantics
/// - `bus_capacity`: runtime-event bus ring buffer size
/// - `fanout_capacity`: per-topic broadcast ring buffer size; slower receivers skip the oldest envelopes
/// - `inbound_capacity`: queue between the SSE reader task and the connection pump
/// - `reconnect`: reconnect schedule handed to the SSE client
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the runtime-event bus.
    pub bus_capacity: usize,
    /// Capacity of each fan-out topic.
    pub fanout_capacity: usize,
    /// Capacity of each transport → pump queue.
    pub inbound_capacity: usize,
    /// Reconnect schedule for [`EventSourceTransport`](crate::EventSourceTransport).
    pub reconnect: ReconnectPolicy,
}

impl Config {
    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Fan-out capacity clamped to a minimum of 1.
    #[inline]
    pub fn fanout_capacity_clamped(&self) -> usize {
        self.fanout_capacity.max(1)
    }

    /// Inbound capacity clamped to a minimum of 1.
    #[inline]
    pub fn inbound_capacity_clamped(&self) -> usize {
        self.inbound_capacity.max(1)
    }
}

impl Default for Config {
    /// - `bus_capacity = 1024`
    /// - `fanout_capacity = 256`
    /// - `inbound_capacity = 256`
    /// - `reconnect = ReconnectPolicy::default()`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            fanout_capacity: 256,
            inbound_capacity: 256,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Reconnect schedule of the SSE client: `first × factor^n`, capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: u32,
    /// Also retry when the very first connect fails.
    pub retry_initial: bool,
}

impl Default for ReconnectPolicy {
    /// `first = 1s`, `max = 30s`, `factor = 2`, `retry_initial = true`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2,
            retry_initial: true,
        }
    }
}

/// What one session connects to and listens for.
///
/// ```rust
/// use streamvisor::{EventBindings, SessionConfig, TransportOptions};
///
/// let cfg = SessionConfig::new("https://example.com/stream", EventBindings::default())
///     .with_options(TransportOptions::default().with_credentials(false))
///     .with_lock_name("orders-lock");
///
/// assert_eq!(cfg.channel_name, "sse-channel");
/// assert_eq!(cfg.lock_name, "orders-lock");
/// ```
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Stream location.
    pub url: String,
    /// Transport options (default: credentials on).
    pub options: TransportOptions,
    /// Event bindings, compared by identity.
    pub events: EventBindings,
    /// Fan-out topic name.
    pub channel_name: String,
    /// Leader lock name.
    pub lock_name: String,
}

impl SessionConfig {
    /// Config with default options, channel name and lock name.
    pub fn new(url: impl Into<String>, events: EventBindings) -> Self {
        Self {
            url: url.into(),
            options: TransportOptions::default(),
            events,
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
        }
    }

    /// Replaces the transport options.
    #[must_use]
    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the event bindings.
    #[must_use]
    pub fn with_events(mut self, events: EventBindings) -> Self {
        self.events = events;
        self
    }

    /// Replaces the url.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Overrides the fan-out topic name.
    #[must_use]
    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// Overrides the lock name.
    #[must_use]
    pub fn with_lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    /// Classifies what moving from `self` to `next` requires.
    pub fn diff(&self, next: &SessionConfig) -> Change {
        if !self.events.same(&next.events) || self.channel_name != next.channel_name {
            Change::Full
        } else if self.url != next.url
            || self.options != next.options
            || self.lock_name != next.lock_name
        {
            Change::Connection
        } else {
            Change::Unchanged
        }
    }
}

/// Result of comparing two session configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing to redo.
    Unchanged,
    /// Re-run the lock/connection epoch; keep the fan-out channel.
    Connection,
    /// Reopen the fan-out channel and re-run the epoch.
    Full,
}
