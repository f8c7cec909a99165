//! Event Bus for observing a game session.
//!
//! The EventBus provides a push-based subscription model: subscribers register
//! callbacks that are invoked for every [`SessionEvent`] the coordinator emits.

use std::sync::Arc;

use tokio::sync::Mutex;

use sleuth_domain::{GameState, PlaybackHandle, SessionId};

/// Something a UI layer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Socket opened for the given session
    Connected { session_id: SessionId },
    /// Socket went away; `intentional` is false when a reconnect is scheduled
    Disconnected { intentional: bool },
    /// A new game state snapshot was published (`None` after a reset)
    StateChanged(Option<Arc<GameState>>),
    /// Narration started or stopped speaking
    NarrationChanged(Option<PlaybackHandle>),
    /// The game is over
    GameEnded { message: String },
    /// The server reported a failure
    ServerError { message: String },
}

type Subscriber = Box<dyn FnMut(SessionEvent) + Send + 'static>;

/// Event bus for session events.
///
/// The bus holds strong references to subscribers, so they persist until the
/// bus is cleared or dropped.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    /// Create a new EventBus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to all events.
    pub async fn subscribe(&self, callback: impl FnMut(SessionEvent) + Send + 'static) {
        self.subscribers.lock().await.push(Box::new(callback));
    }

    /// Dispatch an event to all subscribers.
    ///
    /// Each subscriber's callback is invoked with a clone of the event.
    pub async fn dispatch(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.iter_mut() {
            subscriber(event.clone());
        }
    }

    /// Get the number of subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Clear all subscribers.
    pub async fn clear(&self) {
        self.subscribers.lock().await.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
