//! Broadcast channel used to publish [`SyncSignal`](crate::sync::SyncSignal)s.
//!
//! Every subscriber sees every event emitted after it subscribed. Emitting with
//! no subscribers is not an error.

use thiserror::Error;
use tokio::sync::broadcast;

const DEFAULT_EVENT_LIMIT: usize = 1024;

/// Event-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Bus receiver failed: {0}")]
    ReceiveFailure(String),
}

type Result<T> = std::result::Result<T, Error>;

/// Cloneable broadcast event bus.
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    /// Create a bus that buffers up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
        }
    }

    pub fn subscribe(&self) -> EventReceiver<T> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Emit one event to all current subscribers.
    pub fn emit(&self, event: T) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LIMIT)
    }
}

#[derive(Debug)]
pub struct EventReceiver<T: Clone> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> EventReceiver<T> {
    pub async fn recv(&mut self) -> Result<T> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                Err(Error::ReceiveFailure(format!("lagged {} events", n)))
            }
            Err(broadcast::error::RecvError::Closed) => {
                Err(Error::ReceiveFailure("event bus closed".to_string()))
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}
