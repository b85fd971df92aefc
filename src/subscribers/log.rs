//! # LogWriter — runtime events as `tracing` records
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output
//! ```text
//! [channel-opened] ctx=1 channel="sse-channel"
//! [lock-requested] ctx=1 lock="sse-lock" url="/stream"
//! [leading] ctx=1 lock="sse-lock" url="/stream"
//! [connection-opened] ctx=1 url="/stream"
//! [lock-withdrawn] ctx=2 lock="sse-lock"
//! [connection-closed] ctx=1 url="/stream"
//! [released] ctx=1 lock="sse-lock"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let ctx = e.context.unwrap_or_default();
        match e.kind {
            EventKind::ChannelOpened => {
                tracing::info!("[channel-opened] ctx={ctx} channel={:?}", e.channel);
            }
            EventKind::ChannelClosed => {
                tracing::info!("[channel-closed] ctx={ctx} channel={:?}", e.channel);
            }
            EventKind::LockRequested => {
                tracing::info!("[lock-requested] ctx={ctx} lock={:?} url={:?}", e.lock, e.url);
            }
            EventKind::LockWithdrawn => {
                tracing::info!("[lock-withdrawn] ctx={ctx} lock={:?}", e.lock);
            }
            EventKind::LeadershipAcquired => {
                tracing::info!("[leading] ctx={ctx} lock={:?} url={:?}", e.lock, e.url);
            }
            EventKind::LeadershipReleased => {
                tracing::info!("[released] ctx={ctx} lock={:?}", e.lock);
            }
            EventKind::ConnectionOpened => {
                tracing::info!("[connection-opened] ctx={ctx} url={:?}", e.url);
            }
            EventKind::ConnectionClosed => {
                tracing::info!("[connection-closed] ctx={ctx} url={:?}", e.url);
            }
            EventKind::ConnectionFailed => {
                tracing::warn!(
                    "[connection-failed] ctx={ctx} url={:?} err={:?}",
                    e.url,
                    e.reason
                );
            }
            EventKind::FanoutLagged => {
                tracing::warn!(
                    "[fanout-lagged] ctx={ctx} channel={:?} {}",
                    e.channel,
                    e.reason.as_deref().unwrap_or("")
                );
            }
            EventKind::TransportError => {
                tracing::warn!("[transport-error] url={:?} err={:?}", e.url, e.reason);
            }
            EventKind::CallbackPanicked => {
                tracing::error!(
                    "[callback-panicked] ctx={ctx} event={} info={}",
                    e.name.as_deref().unwrap_or("unknown"),
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(
                    "[subscriber-overflow] subscriber={:?} reason={:?}",
                    e.name,
                    e.reason
                );
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(
                    "[subscriber-panicked] subscriber={} info={}",
                    e.name.as_deref().unwrap_or("unknown"),
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
