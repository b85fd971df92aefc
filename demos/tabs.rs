//! # Demo: tabs
//!
//! Three contexts ("tabs") of one origin subscribe to the same SSE endpoint.
//! Only the leader holds a connection; the other two receive every event
//! through the fan-out channel. Halfway through, the leader closes and one of
//! the followers takes over.
//!
//! ## Flow
//! ```text
//! tab-1 ──► lock "sse-lock" ──► EventSource(url) ──┬─► tab-1 callback
//!                                                  └─► channel "sse-channel" ──► tab-2, tab-3 callbacks
//! tab-1 unmount ──► release ──► tab-2 (or tab-3) leads
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example tabs --features logging -- https://sse.dev/test
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use streamvisor::{Config, EventBindings, LogWriter, Origin, Role, SessionConfig, Subscribe};
use tracing_subscriber::EnvFilter;

fn bindings(tab: &'static str) -> EventBindings {
    EventBindings::builder()
        .on("message", move |data| println!("[{tab}] message: {data}"))
        .on("ping", move |data| println!("[{tab}] ping: {data}"))
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .context("usage: tabs <sse-url>")?;

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let origin = Origin::builder(Config::default())
        .with_subscribers(subs)
        .build();

    let tab1 = origin.context().mount(SessionConfig::new(&url, bindings("tab-1")));
    let tab2 = origin.context().mount(SessionConfig::new(&url, bindings("tab-2")));
    let tab3 = origin.context().mount(SessionConfig::new(&url, bindings("tab-3")));

    tokio::time::sleep(Duration::from_secs(10)).await;

    println!("closing tab-1 (role: {:?})", tab1.role());
    tab1.unmount().await;

    let (mut r2, mut r3) = (tab2.watch_role(), tab3.watch_role());
    tokio::select! {
        r = r2.wait_for(|r| *r == Role::Leading) => { r?; println!("tab-2 took over"); }
        r = r3.wait_for(|r| *r == Role::Leading) => { r?; println!("tab-3 took over"); }
    }

    tokio::time::sleep(Duration::from_secs(10)).await;

    tab2.unmount().await;
    tab3.unmount().await;
    Ok(())
}
