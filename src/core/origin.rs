//! # Origin and contexts.
//!
//! An [`Origin`] is the host every context shares: the lock service, the
//! broadcast service, the transport and the runtime-event bus. A [`Context`] is
//! one independent participant (a "tab"); contexts never share state with each
//! other except through the origin's lock and broadcast services.
//!
//! ```text
//!                 ┌──────────────────── Origin ─────────────────────┐
//!                 │ LockService   BroadcastService   Transport  Bus │
//!                 └──────┬───────────────┬───────────────┬──────────┘
//!                        │               │               │
//!          ┌─────────────┼───────────────┼───────────────┘
//!          ▼             ▼               ▼
//!      Context 1     Context 2       Context N
//!      Session       Session         Session
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::core::config::{Config, SessionConfig};
use crate::core::session::Session;
use crate::core::builder::OriginBuilder;
use crate::events::{Bus, Event};
use crate::host::{BroadcastService, LockService};
use crate::transport::Transport;

/// Shared host of all contexts.
pub struct Origin {
    pub(crate) cfg: Config,
    pub(crate) bus: Bus,
    pub(crate) locks: Arc<dyn LockService>,
    pub(crate) broadcast: Arc<dyn BroadcastService>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) next_context: AtomicU64,
    pub(crate) shutdown: CancellationToken,
}

impl Origin {
    /// Starts building an origin.
    pub fn builder(cfg: Config) -> OriginBuilder {
        OriginBuilder::new(cfg)
    }

    /// Creates a new, independent context.
    pub fn context(self: &Arc<Self>) -> Context {
        Context {
            id: self.next_context.fetch_add(1, Ordering::Relaxed),
            origin: Arc::clone(self),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Runtime-event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Lock service shared by all contexts.
    pub fn locks(&self) -> &Arc<dyn LockService> {
        &self.locks
    }

    /// Broadcast service shared by all contexts.
    pub fn broadcast(&self) -> &Arc<dyn BroadcastService> {
        &self.broadcast
    }

    /// Transport used by leaders.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl Drop for Origin {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin").field("cfg", &self.cfg).finish_non_exhaustive()
    }
}

/// One participant of an origin.
#[derive(Clone)]
pub struct Context {
    id: u64,
    origin: Arc<Origin>,
}

impl Context {
    /// Context id, unique within its origin.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The shared origin.
    pub fn origin(&self) -> &Arc<Origin> {
        &self.origin
    }

    /// Starts a session: opens the fan-out channel and requests leadership.
    ///
    /// Must be called inside a tokio runtime.
    pub fn mount(&self, config: SessionConfig) -> Session {
        Session::mount(self, config)
    }

    /// Publishes a runtime event stamped with this context's id.
    pub(crate) fn publish(&self, ev: Event) {
        self.origin.bus.publish(ev.with_context(self.id));
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}
