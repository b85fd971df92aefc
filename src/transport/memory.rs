//! # In-memory transport.
//!
//! [`MemoryTransport`] plays the server: every `open` creates a pipe the caller
//! can push events into with [`emit`](MemoryTransport::emit). It also counts
//! open connections per url, which makes the single-leader property directly
//! observable in tests.
//!
//! Each open stream is watched by a small task that forgets the pipe once the
//! stream is shut down or its receiver is dropped, so `open` must be called
//! inside a tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{Frame, Inbound, MessageEvent, Transport, TransportOptions};

struct Pipe {
    tx: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
}

impl Pipe {
    fn is_open(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.tx.is_closed()
    }
}

/// Transport whose streams are fed by the caller.
pub struct MemoryTransport {
    pipes: Arc<DashMap<String, Vec<Pipe>>>,
    refused: DashSet<String>,
    opened: AtomicUsize,
    capacity: usize,
}

impl MemoryTransport {
    /// Creates a transport with per-stream capacity 256.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a transport with the given per-stream capacity (min 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pipes: Arc::new(DashMap::new()),
            refused: DashSet::new(),
            opened: AtomicUsize::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Makes every following `open` for `url` fail.
    pub fn refuse(&self, url: &str) {
        self.refused.insert(url.to_string());
    }

    /// Undoes [`refuse`](Self::refuse).
    pub fn allow(&self, url: &str) {
        self.refused.remove(url);
    }

    /// Sends an event to every open stream for `url`; returns how many got it.
    pub fn emit(&self, url: &str, event: &str, data: &str) -> usize {
        self.push(url, Frame::Message(MessageEvent::new(event, data)))
    }

    /// Sends a stream error to every open stream for `url`.
    pub fn fail(&self, url: &str, reason: &str) -> usize {
        self.push(url, Frame::Error(reason.to_string()))
    }

    /// Number of streams for `url` that are currently open.
    pub fn open_connections(&self, url: &str) -> usize {
        self.pipes
            .get(url)
            .map(|pipes| pipes.iter().filter(|p| p.is_open()).count())
            .unwrap_or(0)
    }

    /// Number of urls with at least one stream not yet forgotten.
    pub fn url_count(&self) -> usize {
        self.pipes.len()
    }

    /// Number of successful `open` calls since creation.
    pub fn total_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn push(&self, url: &str, frame: Frame) -> usize {
        let Some(mut pipes) = self.pipes.get_mut(url) else {
            return 0;
        };
        pipes.retain(Pipe::is_open);
        pipes
            .iter()
            .filter(|p| p.tx.try_send(frame.clone()).is_ok())
            .count()
    }
}

/// Drops closed pipes for `url`, and the url itself once none is left.
fn forget_closed(pipes: &DashMap<String, Vec<Pipe>>, url: &str) {
    if let Some(mut list) = pipes.get_mut(url) {
        list.retain(Pipe::is_open);
    }
    pipes.remove_if(url, |_, list| list.is_empty());
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, url: &str, _options: &TransportOptions) -> Result<Inbound, TransportError> {
        if self.refused.contains(url) {
            return Err(TransportError::Refused {
                url: url.to_string(),
            });
        }

        let (tx, frames) = mpsc::channel(self.capacity);
        let shutdown = CancellationToken::new();
        self.pipes.entry(url.to_string()).or_default().push(Pipe {
            tx: tx.clone(),
            shutdown: shutdown.clone(),
        });
        self.opened.fetch_add(1, Ordering::SeqCst);

        let pipes = Arc::clone(&self.pipes);
        let url = url.to_string();
        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tx.closed() => {}
            }
            drop(tx);
            forget_closed(&pipes, &url);
        });
        Ok(Inbound { frames, shutdown })
    }
}
