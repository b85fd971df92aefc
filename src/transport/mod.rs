//! # Server-push transport.
//!
//! The transport is the only component that talks to the network. It turns a
//! url plus [`TransportOptions`] into an [`Inbound`] stream of [`Frame`]s; the
//! rest of the crate never sees the wire format.
//!
//! ```text
//! Transport::open(url, options)
//!        │
//!        ▼
//!   Inbound { frames, shutdown } ──► LiveConnection (listener registry + pump)
//!                                          │
//!                                          ├─► listener("tick")(&MessageEvent)
//!                                          └─► listener("done")(&MessageEvent)
//! ```
//!
//! ## Contents
//! - [`Transport`]: the open capability
//! - [`LiveConnection`]: named listeners over one open stream
//! - [`EventSourceTransport`]: real SSE over HTTP (`eventsource-client`)
//! - [`MemoryTransport`]: in-memory streams driven by the caller (tests, demos)
//!
//! Reconnecting after a transient failure is the transport's own business;
//! an open [`Inbound`] stays logically open until its shutdown token fires.

mod connection;
mod eventsource;
mod memory;

pub use connection::{Listener, ListenerId, LiveConnection};
pub use eventsource::EventSourceTransport;
pub use memory::MemoryTransport;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// One named event delivered by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    /// Event name (`"message"` when the server sent none).
    pub event: String,
    /// Raw payload.
    pub data: String,
    /// Last event id, when the server sent one.
    pub last_event_id: Option<String>,
}

impl MessageEvent {
    /// Creates an event without id.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            last_event_id: None,
        }
    }
}

/// One item read from an open stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A server event.
    Message(MessageEvent),
    /// A transient stream error; the transport keeps reconnecting.
    Error(String),
}

/// Receiving side of an open stream.
///
/// Cancelling `shutdown` closes the underlying connection.
pub struct Inbound {
    /// Frames in arrival order.
    pub frames: mpsc::Receiver<Frame>,
    /// Closes the stream when cancelled.
    pub shutdown: CancellationToken,
}

/// Connection options.
///
/// `with_credentials` (default `true`) controls whether the `credentials`
/// headers (cookies, authorization) are sent; plain `headers` are always sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    /// Send credential headers.
    pub with_credentials: bool,
    /// Credential headers, sent only when `with_credentials` is set.
    pub credentials: Vec<(String, String)>,
    /// Headers sent on every request.
    pub headers: Vec<(String, String)>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            with_credentials: true,
            credentials: Vec::new(),
            headers: Vec::new(),
        }
    }
}

impl TransportOptions {
    /// Sets the credentials flag.
    #[must_use]
    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    /// Adds a credential header (e.g. `Cookie`, `Authorization`).
    #[must_use]
    pub fn credential(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.push((name.into(), value.into()));
        self
    }

    /// Adds a plain header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Headers to send, honoring `with_credentials`.
    pub fn effective_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let credentials: &[(String, String)] = if self.with_credentials {
            &self.credentials
        } else {
            &[]
        };
        self.headers
            .iter()
            .chain(credentials.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Opens server-push streams.
pub trait Transport: Send + Sync + 'static {
    /// Opens a stream for `url`.
    ///
    /// Must not block; network I/O belongs to a task owned by the transport.
    fn open(&self, url: &str, options: &TransportOptions) -> Result<Inbound, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_follow_the_flag() {
        let opts = TransportOptions::default()
            .header("Accept-Language", "en")
            .credential("Cookie", "id=42");

        let with: Vec<_> = opts.effective_headers().collect();
        assert_eq!(with, vec![("Accept-Language", "en"), ("Cookie", "id=42")]);

        let without = opts.clone().with_credentials(false);
        let headers: Vec<_> = without.effective_headers().collect();
        assert_eq!(headers, vec![("Accept-Language", "en")]);
        assert_ne!(opts, without);
    }
}
