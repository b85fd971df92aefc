//! # streamvisor
//!
//! **Streamvisor** shares one server-sent-events stream between many
//! independent contexts of the same origin (think: browser tabs).
//!
//! Exactly one context at a time holds a named lock and owns the live
//! connection. Every event it receives is handed to its own callback and
//! republished on a named broadcast topic; every other context receives it
//! from the topic and runs its own callback. When the leader goes away, the
//! lock passes to the next waiting context, which opens a fresh connection.
//!
//! ## Architecture
//! ### Overview
//! ```text
//! ┌──────────────────────────── Origin ─────────────────────────────┐
//! │  LockService      BroadcastService      Transport      Bus      │
//! └──────┬─────────────────┬──────────────────┬─────────────┬───────┘
//!        │                 │                  │             │
//!        ▼                 ▼                  │             ▼
//!  ┌──────────────┐  ┌──────────────┐         │      SubscriberSet
//!  │  Context 1   │  │  Context 2   │  ...    │      (LogWriter, ...)
//!  │  Session     │  │  Session     │         │
//!  │  ├ Fanout    │◄─┤  ├ Fanout    │         │
//!  │  └ Leader ◄──┼──┼──┼───────────┼─────────┘
//!  │    (holds L) │  │  └ Leader    │
//!  │    LiveConn  │  │    (waiting) │
//!  └──────────────┘  └──────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Context::mount(cfg)
//!   ├─► FanoutChannel::open(cfg.channel_name) + set_receiver(dispatcher)
//!   └─► spawn leader epoch:
//!         ├─► publish LockRequested
//!         ├─► acquire lock (cancellable)
//!         │     └─ aborted ─► LockWithdrawn, exit
//!         ├─► publish LeadershipAcquired
//!         ├─► Transport::open(url, options)
//!         │     └─ Err ─► ConnectionFailed, release, LeadershipReleased, exit
//!         ├─► attach wrapped listeners, start pump
//!         ├─► role = Leading, publish ConnectionOpened
//!         ├─► wait for abort (unmount / reconcile / drop)
//!         └─► detach, close, role = Following, release, LeadershipReleased
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                              |
//! |-------------------|-------------------------------------------------------------|-------------------------------------------------|
//! | **Lifecycle**     | Mount, reconcile and unmount a subscription per context.    | [`Context`], [`Session`], [`SessionConfig`]     |
//! | **Bindings**      | Map event names to callbacks.                               | [`EventBindings`], [`EventBinding`]             |
//! | **Fan-out**       | Relay leader events to every other context.                 | [`FanoutChannel`], [`BroadcastService`]         |
//! | **Election**      | Named locks gate the single live connection.                | [`LockService`], [`Lease`]                      |
//! | **Transport**     | SSE over HTTP or in-memory streams.                         | [`Transport`], [`EventSourceTransport`], [`MemoryTransport`] |
//! | **Subscriber API**| Observe runtime events (logging, metrics, custom).          | [`Subscribe`], [`Event`]                        |
//! | **Errors**        | Typed lock and transport errors.                            | [`LockError`], [`TransportError`]               |
//! | **Configuration** | Origin-wide runtime settings.                               | [`Config`], [`ReconnectPolicy`]                 |
//!
//! ## Optional features
//! - `logging`: exports a [`tracing`]-backed `LogWriter` subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use streamvisor::{Config, EventBindings, MemoryTransport, Origin, Role, SessionConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MemoryTransport::new());
//!     let origin = Origin::builder(Config::default())
//!         .with_transport(transport.clone())
//!         .build();
//!
//!     let events = EventBindings::builder()
//!         .on("tick", |data| println!("tick: {data}"))
//!         .build();
//!     let cfg = SessionConfig::new("/stream", events);
//!
//!     let first = origin.context().mount(cfg.clone());
//!     let second = origin.context().mount(cfg);
//!
//!     first.watch_role().wait_for(|r| *r == Role::Leading).await?;
//!     transport.emit("/stream", "tick", "1"); // both contexts print "tick: 1"
//!
//!     first.unmount().await; // second takes over
//!     second.watch_role().wait_for(|r| *r == Role::Leading).await?;
//!     second.unmount().await;
//!     Ok(())
//! }
//! ```
mod bindings;
mod core;
mod error;
mod events;
mod fanout;
mod host;
mod subscribers;
mod transport;

// ---- Public re-exports ----

pub use crate::core::{
    Change, Config, Context, Origin, OriginBuilder, ReconnectPolicy, Role, Session, SessionConfig,
    DEFAULT_CHANNEL_NAME, DEFAULT_LOCK_NAME,
};
pub use bindings::{Callback, EventBinding, EventBindings, EventBindingsBuilder};
pub use error::{LockError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use fanout::{Dispatch, FanoutChannel};
pub use host::{BroadcastService, Envelope, Lease, LocalBroadcast, LocalLocks, LockService};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::{
    EventSourceTransport, Frame, Inbound, Listener, ListenerId, LiveConnection, MemoryTransport,
    MessageEvent, Transport, TransportOptions,
};

// Optional: expose a tracing-backed logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
