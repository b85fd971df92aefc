//! # LeaderEpoch: one lock-gated connection attempt.
//!
//! A leader epoch runs as one task per (session, configuration). It waits for
//! the named lock; once granted it owns the live connection until the epoch's
//! abort token fires. Holding the lease for the whole connection lifetime is
//! what makes the lock a leader election: whoever holds it is the only context
//! with a connection, and releasing it promotes the next waiter.
//!
//! ## Event flow
//! ```text
//! LockRequested ─┬─► [abort before grant] ──► LockWithdrawn
//!                └─► LeadershipAcquired ─┬─► [open fails] ──► ConnectionFailed ──► LeadershipReleased
//!                                        └─► ConnectionOpened
//!                                              ... abort ...
//!                                            ConnectionClosed ──► LeadershipReleased
//! ```
//!
//! ## Rules
//! - Listeners are attached **before** the pump starts.
//! - Teardown order: abort → detach listeners → close connection and wait for
//!   its pump → release lease. A callback still running when the abort fires
//!   finishes before the next leader can be promoted.
//! - The role watch flips to `Leading` only once the connection is live, and
//!   back to `Following` before the lease is released.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bindings::binder::{self, WrappedBinding};
use crate::core::origin::Context;
use crate::core::session::Role;
use crate::events::{Event, EventKind};
use crate::transport::{LiveConnection, TransportOptions};

/// Parameters of one leader epoch, fixed for its whole life.
pub(crate) struct LeaderParams {
    pub url: Arc<str>,
    pub options: TransportOptions,
    pub lock: Arc<str>,
    pub wrapped: Vec<WrappedBinding>,
}

/// Runs one lock-gated connection attempt for a context.
pub(crate) struct LeaderEpoch {
    ctx: Context,
    params: LeaderParams,
    role: Arc<watch::Sender<Role>>,
}

impl LeaderEpoch {
    pub(crate) fn new(ctx: Context, params: LeaderParams, role: Arc<watch::Sender<Role>>) -> Self {
        Self { ctx, params, role }
    }

    /// Runs until `abort` fires (or the connection cannot be opened).
    pub(crate) async fn run(self, abort: CancellationToken) {
        let LeaderParams {
            url,
            options,
            lock,
            wrapped,
        } = self.params;
        let ctx = self.ctx;

        ctx.publish(
            Event::new(EventKind::LockRequested)
                .with_lock(Arc::clone(&lock))
                .with_url(Arc::clone(&url)),
        );

        let lease = match ctx.origin().locks().acquire(&lock, &abort).await {
            Ok(lease) => lease,
            Err(e) => {
                if !e.is_abort() {
                    tracing::warn!(lock = %lock, error = %e, "lock request ended without grant");
                }
                ctx.publish(
                    Event::new(EventKind::LockWithdrawn)
                        .with_lock(Arc::clone(&lock))
                        .with_reason(e.as_label()),
                );
                return;
            }
        };
        if abort.is_cancelled() {
            lease.release();
            ctx.publish(Event::new(EventKind::LockWithdrawn).with_lock(lock));
            return;
        }

        ctx.publish(
            Event::new(EventKind::LeadershipAcquired)
                .with_lock(Arc::clone(&lock))
                .with_url(Arc::clone(&url)),
        );

        let inbound = match ctx.origin().transport().open(&url, &options) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "could not open stream; releasing leadership");
                ctx.publish(
                    Event::new(EventKind::ConnectionFailed)
                        .with_url(Arc::clone(&url))
                        .with_reason(e.to_string()),
                );
                lease.release();
                ctx.publish(Event::new(EventKind::LeadershipReleased).with_lock(lock));
                return;
            }
        };

        let conn = LiveConnection::new(&ctx, Arc::clone(&url), inbound);
        let attached = binder::attach(&conn, &wrapped).await;
        conn.start().await;
        self.role.send_replace(Role::Leading);
        ctx.publish(Event::new(EventKind::ConnectionOpened).with_url(Arc::clone(&url)));

        abort.cancelled().await;

        binder::detach(&conn, attached).await;
        conn.shutdown().await;
        drop(conn);
        self.role.send_replace(Role::Following);
        ctx.publish(Event::new(EventKind::ConnectionClosed).with_url(url));

        lease.release();
        ctx.publish(Event::new(EventKind::LeadershipReleased).with_lock(lock));
    }
}
