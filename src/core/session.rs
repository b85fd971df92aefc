//! # Session: lifecycle of one context's subscription.
//!
//! A [`Session`] ties a [`SessionConfig`] to a context:
//! - a [`FanoutChannel`] whose receiver routes envelopes to the local callbacks;
//! - a leader epoch that waits for the lock and, once granted, owns the live
//!   connection and republishes every bound event on the channel.
//!
//! ## Lifecycle
//! ```text
//! mount(cfg) ──► open channel ──► set receiver ──► spawn epoch
//!                                                     │
//! reconcile(next):                                    │
//!   Unchanged   ──► no-op                             │
//!   Connection  ──► stop epoch ──► spawn epoch        │
//!   Full        ──► stop epoch ──► close channel ──► open channel ──► spawn epoch
//!                                                     │
//! unmount() ──► stop epoch (detach, close conn, drain pump, release lock) ──► shut down channel
//! ```
//!
//! ## Rules
//! - Stopping an epoch awaits its task, so the lock is free again and the
//!   connection closed before the next epoch is spawned.
//! - `unmount` and a `Full` reconcile also wait for the channel's receive loop:
//!   once they return, no callback of the old configuration is running.
//! - Dropping a session without [`unmount`](Session::unmount) still aborts the
//!   epoch and closes the channel; the epoch finishes its teardown in the
//!   background.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bindings::binder;
use crate::core::config::{Change, SessionConfig};
use crate::core::leader::{LeaderEpoch, LeaderParams};
use crate::core::origin::Context;
use crate::fanout::FanoutChannel;

/// Which part a context currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receives events through the fan-out channel.
    Following,
    /// Holds the lock and owns the live connection.
    Leading,
}

struct EpochHandle {
    abort: CancellationToken,
    join: JoinHandle<()>,
}

/// One mounted subscription of a context.
pub struct Session {
    ctx: Context,
    config: SessionConfig,
    channel: Option<Arc<FanoutChannel>>,
    epoch: Option<EpochHandle>,
    role: Arc<watch::Sender<Role>>,
}

impl Session {
    pub(crate) fn mount(ctx: &Context, config: SessionConfig) -> Self {
        let (role, _) = watch::channel(Role::Following);
        let mut session = Self {
            ctx: ctx.clone(),
            config,
            channel: None,
            epoch: None,
            role: Arc::new(role),
        };
        let channel = session.open_channel();
        session.start_epoch(&channel);
        session
    }

    /// Applies a new configuration, redoing only what changed.
    pub async fn reconcile(&mut self, next: SessionConfig) -> Change {
        let change = self.config.diff(&next);
        self.config = next;
        match change {
            Change::Unchanged => {}
            Change::Connection => {
                self.stop_epoch().await;
                let channel = self.open_channel();
                self.start_epoch(&channel);
            }
            Change::Full => {
                self.stop_epoch().await;
                self.shutdown_channel().await;
                let channel = self.open_channel();
                self.start_epoch(&channel);
            }
        }
        tracing::debug!(context = self.ctx.id(), ?change, "session reconciled");
        change
    }

    /// Tears the session down: releases leadership (or withdraws the pending
    /// lock request) and closes the channel.
    pub async fn unmount(mut self) {
        self.stop_epoch().await;
        self.shutdown_channel().await;
    }

    /// Current role.
    pub fn role(&self) -> Role {
        *self.role.borrow()
    }

    /// True while this session owns the live connection.
    pub fn is_leading(&self) -> bool {
        self.role() == Role::Leading
    }

    /// Receiver of role changes.
    pub fn watch_role(&self) -> watch::Receiver<Role> {
        self.role.subscribe()
    }

    /// Active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Id of the owning context.
    pub fn context_id(&self) -> u64 {
        self.ctx.id()
    }

    /// Id of the current fan-out handle.
    pub fn channel_id(&self) -> Option<u64> {
        self.channel.as_ref().map(|c| c.id())
    }

    /// Opens the channel if there is none and (re)installs the dispatcher for
    /// the current bindings.
    fn open_channel(&mut self) -> Arc<FanoutChannel> {
        let channel = match &self.channel {
            Some(channel) => Arc::clone(channel),
            None => {
                let channel = Arc::new(FanoutChannel::open(&self.ctx, &self.config.channel_name));
                self.channel = Some(Arc::clone(&channel));
                channel
            }
        };
        channel.set_receiver(binder::dispatcher(&self.config.events));
        channel
    }

    async fn shutdown_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.shutdown().await;
        }
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    fn start_epoch(&mut self, channel: &Arc<FanoutChannel>) {
        let params = LeaderParams {
            url: self.config.url.as_str().into(),
            options: self.config.options.clone(),
            lock: self.config.lock_name.as_str().into(),
            wrapped: binder::wrap(&self.config.events, channel),
        };
        let epoch = LeaderEpoch::new(self.ctx.clone(), params, Arc::clone(&self.role));
        let abort = CancellationToken::new();
        let join = tokio::spawn(epoch.run(abort.clone()));
        self.epoch = Some(EpochHandle { abort, join });
    }

    async fn stop_epoch(&mut self) {
        let Some(EpochHandle { abort, join }) = self.epoch.take() else {
            return;
        };
        abort.cancel();
        if let Err(e) = join.await {
            tracing::error!(context = self.ctx.id(), error = %e, "leader epoch ended abnormally");
            self.role.send_replace(Role::Following);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(epoch) = self.epoch.take() {
            epoch.abort.cancel();
        }
        self.close_channel();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.ctx.id())
            .field("role", &self.role())
            .field("channel", &self.channel_id())
            .finish()
    }
}
