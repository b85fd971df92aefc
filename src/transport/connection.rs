//! # LiveConnection: named listeners over one open stream.
//!
//! A [`LiveConnection`] owns an [`Inbound`] stream and a registry of listeners
//! keyed by event name. It exists only inside the leading context.
//!
//! ## Lifecycle
//! ```text
//! new(inbound) ──► add_listener(..)* ──► start() ──► [pump dispatches frames]
//!                                                        │
//!              remove_listener(..)* ──► close() ◄────────┘
//! ```
//!
//! ## Rules
//! - Nothing is dispatched before [`start`](LiveConnection::start), so listeners
//!   attached before it see every event.
//! - After [`close`](LiveConnection::close) the pump stops and the transport
//!   stream is shut down; close is idempotent and also runs on drop.
//! - [`shutdown`](LiveConnection::shutdown) closes and then waits for the pump,
//!   so no listener call is still running when it returns.
//! - Each listener call is isolated: a panic is reported as `CallbackPanicked`
//!   and the remaining listeners still run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::Context;
use crate::events::{panic_message, Event, EventKind};
use crate::transport::{Frame, Inbound, MessageEvent};

/// Handler attached to a connection for one event name.
pub type Listener = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

/// Identifies one attached listener (returned by `add_listener`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registry = Arc<RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>>;

/// An open server-push connection with a listener registry.
pub struct LiveConnection {
    url: Arc<str>,
    ctx: Context,
    listeners: Registry,
    next_id: AtomicU64,
    frames: Mutex<Option<mpsc::Receiver<Frame>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl LiveConnection {
    /// Wraps an opened stream. The pump is not running yet.
    pub fn new(ctx: &Context, url: impl Into<Arc<str>>, inbound: Inbound) -> Self {
        Self {
            url: url.into(),
            ctx: ctx.clone(),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            frames: Mutex::new(Some(inbound.frames)),
            pump: Mutex::new(None),
            shutdown: inbound.shutdown,
        }
    }

    /// Stream url.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attaches `listener` for events named `event`.
    pub async fn add_listener(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .await
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Detaches one listener. Returns `false` if it was not attached.
    pub async fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Total number of attached listeners.
    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.values().map(Vec::len).sum()
    }

    /// Starts dispatching frames. Calling it again, or after close, does nothing.
    pub async fn start(&self) {
        if self.is_closed() {
            return;
        }
        let Some(frames) = self.frames.lock().await.take() else {
            return;
        };
        let handle = tokio::spawn(pump(
            frames,
            Arc::clone(&self.listeners),
            self.shutdown.clone(),
            self.ctx.clone(),
            Arc::clone(&self.url),
        ));
        *self.pump.lock().await = Some(handle);
    }

    /// Closes the stream. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Closes the stream and waits for the pump to stop, including a listener
    /// call that is in progress.
    pub async fn shutdown(&self) {
        self.close();
        let Some(pump) = self.pump.lock().await.take() else {
            return;
        };
        if let Err(e) = pump.await {
            tracing::error!(url = %self.url, error = %e, "connection pump ended abnormally");
        }
    }

    /// True once the stream is closed.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConnection")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn pump(
    mut frames: mpsc::Receiver<Frame>,
    listeners: Registry,
    shutdown: CancellationToken,
    ctx: Context,
    url: Arc<str>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match frame {
            Frame::Message(ev) => dispatch(&listeners, &ev, &ctx).await,
            Frame::Error(reason) => {
                ctx.publish(
                    Event::new(EventKind::TransportError)
                        .with_url(Arc::clone(&url))
                        .with_reason(reason),
                );
            }
        }
    }
    tracing::debug!(%url, "connection pump stopped");
}

async fn dispatch(listeners: &Registry, ev: &MessageEvent, ctx: &Context) {
    let targets: Vec<Listener> = match listeners.read().await.get(&ev.event) {
        Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
        None => return,
    };

    for listener in targets {
        let call = std::panic::AssertUnwindSafe(|| listener(ev));
        if let Err(panic_err) = std::panic::catch_unwind(call) {
            let info = panic_message(&*panic_err);
            tracing::error!(event = %ev.event, %info, "stream listener panicked");
            ctx.publish(Event::callback_panicked(&ev.event, info));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, Origin};
    use crate::transport::MemoryTransport;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    fn inbound() -> (mpsc::Sender<Frame>, Inbound) {
        let (tx, frames) = mpsc::channel(16);
        let inbound = Inbound {
            frames,
            shutdown: CancellationToken::new(),
        };
        (tx, inbound)
    }

    fn context() -> Context {
        Origin::builder(Config::default())
            .with_transport(Arc::new(MemoryTransport::new()))
            .build()
            .context()
    }

    fn counter(hits: &Arc<AtomicUsize>) -> Listener {
        let hits = Arc::clone(hits);
        Arc::new(move |_ev: &MessageEvent| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn nothing_is_dispatched_before_start() {
        let (tx, inbound) = inbound();
        let conn = LiveConnection::new(&context(), "/stream", inbound);
        let hits = Arc::new(AtomicUsize::new(0));

        tx.send(Frame::Message(MessageEvent::new("tick", "1")))
            .await
            .expect("queued");
        conn.add_listener("tick", counter(&hits)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        conn.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listeners_are_selected_by_event_name() {
        let (tx, inbound) = inbound();
        let conn = LiveConnection::new(&context(), "/stream", inbound);
        let ticks = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));
        conn.add_listener("tick", counter(&ticks)).await;
        conn.add_listener("other", counter(&other)).await;
        conn.start().await;

        tx.send(Frame::Message(MessageEvent::new("tick", "1"))).await.unwrap();
        tx.send(Frame::Message(MessageEvent::new("unknown", "1"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn removed_listener_is_not_called_and_count_drops() {
        let (tx, inbound) = inbound();
        let conn = LiveConnection::new(&context(), "/stream", inbound);
        let hits = Arc::new(AtomicUsize::new(0));
        let id = conn.add_listener("tick", counter(&hits)).await;
        conn.start().await;

        assert!(conn.remove_listener("tick", id).await);
        assert!(!conn.remove_listener("tick", id).await);
        assert_eq!(conn.listener_count().await, 0);

        tx.send(Frame::Message(MessageEvent::new("tick", "1"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_starve_the_next_one() {
        let (tx, inbound) = inbound();
        let conn = LiveConnection::new(&context(), "/stream", inbound);
        let hits = Arc::new(AtomicUsize::new(0));
        conn.add_listener("tick", Arc::new(|_ev: &MessageEvent| panic!("listener failure")))
            .await;
        conn.add_listener("tick", counter(&hits)).await;
        conn.start().await;

        tx.send(Frame::Message(MessageEvent::new("tick", "1"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_stops_delivery_and_is_idempotent() {
        let (tx, inbound) = inbound();
        let shutdown = inbound.shutdown.clone();
        let conn = LiveConnection::new(&context(), "/stream", inbound);
        let hits = Arc::new(AtomicUsize::new(0));
        conn.add_listener("tick", counter(&hits)).await;
        conn.start().await;

        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(shutdown.is_cancelled());

        let _ = tx.send(Frame::Message(MessageEvent::new("tick", "1"))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_waits_for_running_listener() {
        let (tx, inbound) = inbound();
        let conn = LiveConnection::new(&context(), "/stream", inbound);
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            conn.add_listener(
                "tick",
                Arc::new(move |_ev: &MessageEvent| {
                    started.store(true, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(200));
                    finished.store(true, Ordering::SeqCst);
                }),
            )
            .await;
        }
        conn.start().await;

        tx.send(Frame::Message(MessageEvent::new("tick", "1"))).await.unwrap();
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        conn.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
        conn.shutdown().await;
    }
}
