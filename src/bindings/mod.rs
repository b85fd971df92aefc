//! # Event bindings: named callbacks supplied by the caller.
//!
//! An [`EventBinding`] pairs a stream event name with a callback receiving the
//! event payload. [`EventBindings`] is the immutable, shared list a session is
//! configured with.
//!
//! ## Identity
//! `EventBindings` is compared by **identity**, not by content: cloning keeps
//! the identity, building a new list creates a new one. A session treats a new
//! identity as "the event list changed" and rewires its fan-out channel.
//!
//! ```rust
//! use streamvisor::EventBindings;
//!
//! let events = EventBindings::builder()
//!     .on("tick", |data| println!("tick {data}"))
//!     .on("done", |_| println!("done"))
//!     .build();
//!
//! let same = events.clone();
//! assert!(events.same(&same));
//! assert_eq!(events.len(), 2);
//! ```

pub(crate) mod binder;

use std::fmt;
use std::sync::Arc;

/// Callback invoked with an event payload.
pub type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// A stream event name paired with its callback.
#[derive(Clone)]
pub struct EventBinding {
    name: Arc<str>,
    callback: Callback,
}

impl EventBinding {
    /// Creates a binding.
    pub fn new<F>(name: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the callback.
    pub fn call(&self, data: &str) {
        (self.callback)(data)
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Shared, immutable list of bindings compared by identity.
///
/// Names are expected to be unique; with duplicates, fan-out dispatch uses the
/// first match.
#[derive(Clone)]
pub struct EventBindings(Arc<[EventBinding]>);

impl EventBindings {
    /// Starts a builder.
    pub fn builder() -> EventBindingsBuilder {
        EventBindingsBuilder::default()
    }

    /// True if both values come from the same list instance.
    pub fn same(&self, other: &EventBindings) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// First binding with the given name.
    pub fn find(&self, name: &str) -> Option<&EventBinding> {
        self.0.iter().find(|b| b.name() == name)
    }

    /// Iterates bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &EventBinding> {
        self.0.iter()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for EventBindings {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl From<Vec<EventBinding>> for EventBindings {
    fn from(list: Vec<EventBinding>) -> Self {
        Self(list.into())
    }
}

impl FromIterator<EventBinding> for EventBindings {
    fn from_iter<I: IntoIterator<Item = EventBinding>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for EventBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter().map(|b| b.name())).finish()
    }
}

/// Builder for [`EventBindings`].
#[derive(Default)]
pub struct EventBindingsBuilder {
    list: Vec<EventBinding>,
}

impl EventBindingsBuilder {
    /// Adds a binding for `name`.
    #[must_use]
    pub fn on<F>(mut self, name: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.list.push(EventBinding::new(name, callback));
        self
    }

    /// Finishes the list.
    pub fn build(self) -> EventBindings {
        EventBindings::from(self.list)
    }
}
