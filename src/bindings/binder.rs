//! Wiring of event bindings onto the live connection and the fan-out channel.
//!
//! ```text
//! leader:    transport ──► wrapped(name) ──┬─► channel.publish(name, data)
//!                                          └─► callback(data)
//! follower:  channel receive ──► dispatcher(name, data) ──► callback(data)
//! ```
//!
//! The dispatcher calls raw callbacks only, so a follower never re-publishes
//! what it received.

use std::sync::Arc;

use crate::bindings::EventBindings;
use crate::fanout::{Dispatch, FanoutChannel};
use crate::transport::{Listener, ListenerId, LiveConnection, MessageEvent};

/// A binding whose listener also publishes to the fan-out channel.
#[derive(Clone)]
pub(crate) struct WrappedBinding {
    pub(crate) name: Arc<str>,
    pub(crate) listener: Listener,
}

/// Listener ids handed out by one [`attach`] call.
#[derive(Debug, Default)]
pub(crate) struct Attached {
    ids: Vec<(Arc<str>, ListenerId)>,
}

impl Attached {
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Wraps every binding: publish `{name, data}` first, then run the callback.
pub(crate) fn wrap(bindings: &EventBindings, channel: &Arc<FanoutChannel>) -> Vec<WrappedBinding> {
    bindings
        .iter()
        .map(|binding| {
            let channel = Arc::clone(channel);
            let binding = binding.clone();
            let name: Arc<str> = binding.name().into();
            let listener: Listener = Arc::new(move |ev: &MessageEvent| {
                channel.publish(binding.name(), &ev.data);
                binding.call(&ev.data);
            });
            WrappedBinding { name, listener }
        })
        .collect()
}

/// Builds the fan-out receiver: first binding with a matching name, or nothing.
pub(crate) fn dispatcher(bindings: &EventBindings) -> Dispatch {
    let bindings = bindings.clone();
    Arc::new(move |name: &str, data: &str| {
        if let Some(binding) = bindings.find(name) {
            binding.call(data);
        }
    })
}

/// Attaches every wrapped listener under its event name.
pub(crate) async fn attach(conn: &LiveConnection, wrapped: &[WrappedBinding]) -> Attached {
    let mut attached = Attached::default();
    for w in wrapped {
        let id = conn.add_listener(&w.name, Arc::clone(&w.listener)).await;
        attached.ids.push((Arc::clone(&w.name), id));
    }
    attached
}

/// Detaches listeners one by one; a missing one does not stop the others.
pub(crate) async fn detach(conn: &LiveConnection, attached: Attached) {
    for (name, id) in attached.ids {
        if !conn.remove_listener(&name, id).await {
            tracing::debug!(event = %name, "listener already detached");
        }
    }
}
