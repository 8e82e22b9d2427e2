use std::sync::{RwLock, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use strata_types::{ActorId, RepositoryId};

use crate::event::{EngineEvent, EventKind};

/// Receives engine events after the state change they describe is durable.
///
/// `publish` must not block on I/O; implementations hand the event off and
/// return. Delivery failures are the sink's own concern.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &EngineEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event: &EngineEvent) {}
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Subset of events a subscriber wants to see.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
    pub repository: Option<RepositoryId>,
    pub actor: Option<ActorId>,
}

impl EventFilter {
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &EngineEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(ref repo) = self.repository {
            if repo != &event.repository {
                return false;
            }
        }
        if let Some(ref actor) = self.actor {
            if actor != &event.actor {
                return false;
            }
        }
        true
    }
}

/// A broadcast receiver for engine events.
pub type EventStream = broadcast::Receiver<EngineEvent>;

struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<EngineEvent>,
}

/// In-process fan-out of engine events to filtered subscribers.
///
/// Each subscriber owns a bounded broadcast channel. A slow subscriber
/// lags (and later sees `RecvError::Lagged`); publishing never waits.
/// Subscribers whose receivers were all dropped are pruned on the next
/// publish.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (sender, receiver) = broadcast::channel(self.capacity);
        self.write().push(Subscriber { filter, sender });
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.read() {
            Ok(subs) => subs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    // A panicking subscriber registration cannot corrupt a Vec push, so a
    // poisoned lock is still usable.
    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscriber>> {
        match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl NotificationSink for EventBus {
    fn publish(&self, event: &EngineEvent) {
        let mut subs = self.write();
        let before = subs.len();
        subs.retain(|sub| {
            if sub.filter.matches(event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
        if subs.len() < before {
            debug!(pruned = before - subs.len(), "dropped closed event subscribers");
        }
        trace!(kind = %event.kind, subject = %event.subject, "event published");
    }
}
