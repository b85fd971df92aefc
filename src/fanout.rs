//! # Broadcast fan-out of stream events between contexts.
//!
//! A [`FanoutChannel`] is one context's handle on a named broadcast topic. The
//! leader publishes every stream event it receives; every *other* open handle
//! with the same name hands the event to its receiver, which routes it to the
//! local callback registered under that event name.
//!
//! ```text
//!  leader ctx                         follower ctx
//!  ┌──────────────┐   Envelope       ┌──────────────────┐
//!  │ publish(n,d) │ ───────────────► │ receive loop     │
//!  └──────────────┘  (topic "C")     │  └► dispatch(n,d)│
//!         ✗ (own handle filtered)    └──────────────────┘
//! ```
//!
//! ## Rules
//! - **No self-delivery**: envelopes are tagged with the publishing handle id.
//! - **One receiver**: [`set_receiver`](FanoutChannel::set_receiver) replaces the previous one.
//! - **Idempotent close**: closing twice (or dropping after close) is a no-op;
//!   publishing on a closed handle does nothing.
//! - **Isolation**: a panicking receiver is reported as `CallbackPanicked` and
//!   the loop keeps running.
//! - **Loss is visible**: a receiver that falls more than the topic capacity
//!   behind skips the oldest envelopes and publishes `FanoutLagged`.
//! - [`shutdown`](FanoutChannel::shutdown) closes and waits for the receive
//!   loop, including a dispatch in progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::Context;
use crate::events::{panic_message, Event, EventKind};
use crate::host::{BroadcastService, Envelope};

/// Handle id source; unique across all contexts of the process.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Routes an incoming `(event name, payload)` pair to local callbacks.
pub type Dispatch = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// One context's handle on a named broadcast topic.
pub struct FanoutChannel {
    id: u64,
    name: Arc<str>,
    ctx: Context,
    tx: broadcast::Sender<Envelope>,
    receiver: watch::Sender<Option<Dispatch>>,
    closed: CancellationToken,
    receive: Mutex<Option<JoinHandle<()>>>,
}

impl FanoutChannel {
    /// Joins topic `name` on the context's broadcast service and starts the
    /// receive loop. Envelopes arriving before a receiver is set are dropped.
    pub fn open(ctx: &Context, name: &str) -> Self {
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = name.into();
        let service = Arc::clone(ctx.origin().broadcast());
        let (tx, rx) = service.join(&name);
        let (receiver, dispatch_rx) = watch::channel(None);
        let closed = CancellationToken::new();

        let receive = tokio::spawn(receive_loop(
            ReceiveLoop {
                id,
                name: Arc::clone(&name),
                ctx: ctx.clone(),
                service,
                closed: closed.clone(),
            },
            rx,
            dispatch_rx,
        ));

        ctx.publish(Event::new(EventKind::ChannelOpened).with_channel(Arc::clone(&name)));
        Self {
            id,
            name,
            ctx: ctx.clone(),
            tx,
            receiver,
            closed,
            receive: Mutex::new(Some(receive)),
        }
    }

    /// Handle id (unique per open call).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Sends `(name, data)` to every other open handle on this topic.
    pub fn publish(&self, name: &str, data: &str) {
        if self.is_closed() {
            return;
        }
        let _ = self.tx.send(Envelope {
            sender: self.id,
            name: name.into(),
            data: data.into(),
        });
    }

    /// Installs `dispatch` as the only receiver of incoming envelopes.
    pub fn set_receiver(&self, dispatch: Dispatch) {
        self.receiver.send_replace(Some(dispatch));
    }

    /// Stops receiving and releases the topic name once the loop has exited.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.receiver.send_replace(None);
        self.ctx
            .publish(Event::new(EventKind::ChannelClosed).with_channel(Arc::clone(&self.name)));
    }

    /// Closes the handle and waits until its receive loop has exited.
    pub async fn shutdown(&self) {
        self.close();
        let Some(receive) = self.receive.lock().await.take() else {
            return;
        };
        if let Err(e) = receive.await {
            tracing::error!(channel = %self.name, error = %e, "fan-out receive loop ended abnormally");
        }
    }
}

impl Drop for FanoutChannel {
    fn drop(&mut self) {
        self.close();
    }
}

struct ReceiveLoop {
    id: u64,
    name: Arc<str>,
    ctx: Context,
    service: Arc<dyn BroadcastService>,
    closed: CancellationToken,
}

async fn receive_loop(
    me: ReceiveLoop,
    mut rx: broadcast::Receiver<Envelope>,
    dispatch_rx: watch::Receiver<Option<Dispatch>>,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = me.closed.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %me.name, skipped, "fan-out receiver lagged");
                    me.ctx.publish(
                        Event::new(EventKind::FanoutLagged)
                            .with_channel(Arc::clone(&me.name))
                            .with_reason(format!("skipped={skipped}")),
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if envelope.sender == me.id {
            continue;
        }

        let dispatch = dispatch_rx.borrow().clone();
        let Some(dispatch) = dispatch else {
            continue;
        };
        let call = std::panic::AssertUnwindSafe(|| dispatch(&envelope.name, &envelope.data));
        if let Err(panic_err) = std::panic::catch_unwind(call) {
            let info = panic_message(&*panic_err);
            tracing::error!(channel = %me.name, event = %envelope.name, %info, "fan-out callback panicked");
            me.ctx
                .publish(Event::callback_panicked(&envelope.name, info).with_channel(Arc::clone(&me.name)));
        }
    }

    drop(rx);
    me.service.release(&me.name);
}
