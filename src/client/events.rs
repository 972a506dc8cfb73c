//! Session change notifications between client views.

use tokio::sync::broadcast;

use crate::models::SessionSummary;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A session was created server-side by a first message.
    ChatCreated(SessionSummary),
    /// A turn was appended to an existing session.
    ChatUpdated(SessionSummary),
    ChatDeleted { session_id: String },
    ChatOpened { session_id: String },
    /// The user went back to the empty welcome state.
    NewChat,
}

/// Broadcast channel shared by all views of one signed-in user.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
