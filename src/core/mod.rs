//! Runtime core: origin, contexts and session lifecycle.
//!
//! - [`origin`]: shared host services and per-tab contexts;
//! - [`builder`]: assembles an origin from optional services;
//! - [`config`]: origin-wide and per-session configuration;
//! - [`session`]: mount, reconcile and unmount of one subscription;
//! - [`leader`]: the lock-gated connection epoch run by each session.

mod builder;
mod config;
mod leader;
mod origin;
mod session;

pub use builder::OriginBuilder;
pub use config::{Change, Config, ReconnectPolicy, SessionConfig, DEFAULT_CHANNEL_NAME, DEFAULT_LOCK_NAME};
pub use origin::{Context, Origin};
pub use session::{Role, Session};
