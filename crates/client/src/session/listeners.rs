//! Listener registry: at most one handler per event kind.
//!
//! Subscribing to a kind that already has a handler replaces it. The returned
//! [`Subscription`] removes the handler when dropped, but only while it is
//! still the active one, so a stale handle can never remove its replacement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use agileflow_protocol::{ServerEvent, ServerEventKind};

/// Everything a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    /// Reconnection budget exhausted
    ConnectionFailed,
    Server(ServerEventKind),
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::ConnectionFailed => "connection_failed",
            EventKind::Server(kind) => kind.as_str(),
        }
    }
}

impl From<ServerEventKind> for EventKind {
    fn from(kind: ServerEventKind) -> Self {
        EventKind::Server(kind)
    }
}

/// Notification handed to listeners, after it has been merged.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    ConnectionFailed { message: String },
    Server(ServerEvent),
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::Connected => EventKind::Connect,
            SyncEvent::Disconnected => EventKind::Disconnect,
            SyncEvent::ConnectionFailed { .. } => EventKind::ConnectionFailed,
            SyncEvent::Server(event) => EventKind::Server(event.kind()),
        }
    }
}

pub type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    active: HashMap<EventKind, (u64, Listener)>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    slots: Mutex<Slots>,
}

impl ListenerRegistry {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(self: &Arc<Self>, kind: EventKind, listener: Listener) -> Subscription {
        let mut slots = self.slots();
        slots.next_id += 1;
        let id = slots.next_id;
        if slots.active.insert(kind, (id, listener)).is_some() {
            tracing::debug!(event = kind.as_str(), "Replacing existing listener");
        }

        Subscription {
            registry: Arc::downgrade(self),
            kind,
            id,
        }
    }

    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut slots = self.slots();
        match slots.active.get(&kind) {
            Some((active_id, _)) if *active_id == id => {
                slots.active.remove(&kind);
                true
            }
            _ => false,
        }
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.slots().active.contains_key(&kind)
    }

    /// Invoke the handler for the event's kind, if any.
    ///
    /// The handler is cloned out first so it runs without the registry lock
    /// held and may itself subscribe or unsubscribe.
    pub fn dispatch(&self, event: &SyncEvent) {
        let listener = self
            .slots()
            .active
            .get(&event.kind())
            .map(|(_, listener)| Arc::clone(listener));
        if let Some(listener) = listener {
            listener(event);
        }
    }

    pub fn clear(&self) {
        self.slots().active.clear();
    }
}

/// Handle for an active listener; dropping it unsubscribes.
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether this handle's listener is still the one receiving events.
    pub fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .slots()
                .active
                .get(&self.kind)
                .is_some_and(|(id, _)| *id == self.id)
        })
    }

    /// Explicit unsubscribe; same as dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}
