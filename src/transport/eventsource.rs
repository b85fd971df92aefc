//! # Server-Sent Events over HTTP.
//!
//! [`EventSourceTransport`] opens streams with the `eventsource-client` crate.
//! Each open spawns one reader task that forwards events into the [`Inbound`]
//! queue until the shutdown token fires or the queue is dropped.
//!
//! Reconnecting after a dropped connection is done by the client itself,
//! configured from [`ReconnectPolicy`]; stream errors are forwarded as
//! [`Frame::Error`] and the reader keeps going.

use eventsource_client::{self as es, Client};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::ReconnectPolicy;
use crate::error::TransportError;
use crate::transport::{Frame, Inbound, MessageEvent, Transport, TransportOptions};

/// Real SSE transport.
#[derive(Clone, Debug)]
pub struct EventSourceTransport {
    reconnect: ReconnectPolicy,
    capacity: usize,
}

impl EventSourceTransport {
    /// Creates a transport with the given reconnect policy and inbound queue capacity (min 1).
    pub fn new(reconnect: ReconnectPolicy, capacity: usize) -> Self {
        Self {
            reconnect,
            capacity: capacity.max(1),
        }
    }

    fn reconnect_options(&self) -> es::ReconnectOptions {
        es::ReconnectOptions::reconnect(true)
            .retry_initial(self.reconnect.retry_initial)
            .delay(self.reconnect.first)
            .backoff_factor(self.reconnect.factor.max(1))
            .delay_max(self.reconnect.max)
            .build()
    }
}

impl Default for EventSourceTransport {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default(), 256)
    }
}

impl Transport for EventSourceTransport {
    fn open(&self, url: &str, options: &TransportOptions) -> Result<Inbound, TransportError> {
        let mut builder =
            es::ClientBuilder::for_url(url).map_err(|e| TransportError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        for (name, value) in options.effective_headers() {
            builder = builder
                .header(name, value)
                .map_err(|e| TransportError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
        }
        let client = builder.reconnect(self.reconnect_options()).build();

        let (tx, frames) = mpsc::channel(self.capacity);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                let item = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    item = stream.next() => item,
                };
                let frame = match item {
                    Some(Ok(es::SSE::Event(ev))) => Frame::Message(MessageEvent {
                        event: ev.event_type,
                        data: ev.data,
                        last_event_id: ev.id,
                    }),
                    Some(Ok(es::SSE::Comment(_))) => {
                        // keep-alive
                        continue;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%url, error = %e, "sse stream error");
                        Frame::Error(e.to_string())
                    }
                    None => {
                        tracing::debug!(%url, "sse stream ended");
                        break;
                    }
                };
                if tx.send(frame).await.is_err() {
                    tracing::debug!(%url, "sse receiver dropped");
                    break;
                }
            }
        });

        Ok(Inbound { frames, shutdown })
    }
}
