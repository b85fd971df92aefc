use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::{config::Config, origin::Origin};
use crate::{
    events::Bus,
    host::{BroadcastService, LocalBroadcast, LocalLocks, LockService},
    subscribers::{Subscribe, SubscriberSet},
    transport::{EventSourceTransport, Transport},
};

/// Builder for constructing an [`Origin`] with optional services.
pub struct OriginBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    locks: Option<Arc<dyn LockService>>,
    broadcast: Option<Arc<dyn BroadcastService>>,
    transport: Option<Arc<dyn Transport>>,
}

impl OriginBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            locks: None,
            broadcast: None,
            transport: None,
        }
    }

    /// Sets runtime-event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the in-process [`LocalLocks`].
    pub fn with_locks(mut self, locks: Arc<dyn LockService>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Replaces the in-process [`LocalBroadcast`].
    pub fn with_broadcast(mut self, broadcast: Arc<dyn BroadcastService>) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Replaces the default [`EventSourceTransport`].
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the origin.
    ///
    /// When subscribers are configured this spawns the bus listener, so it must
    /// be called inside a tokio runtime.
    pub fn build(self) -> Arc<Origin> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shutdown = CancellationToken::new();

        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            spawn_listener(&bus, subs, shutdown.clone());
        }

        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(LocalLocks::new()));
        let broadcast = self
            .broadcast
            .unwrap_or_else(|| Arc::new(LocalBroadcast::new(self.cfg.fanout_capacity_clamped())));
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(EventSourceTransport::new(
                self.cfg.reconnect,
                self.cfg.inbound_capacity_clamped(),
            ))
        });

        Arc::new(Origin {
            cfg: self.cfg,
            bus,
            locks,
            broadcast,
            transport,
            next_context: AtomicU64::new(1),
            shutdown,
        })
    }
}

/// Forwards bus events to the subscriber set until the origin is dropped.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, shutdown: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "runtime-event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        subs.shutdown().await;
    });
}
