//! Change event delivery.
//!
//! A bounded queue with consumer-group semantics: every published event is
//! delivered to exactly one [`EventConsumer`], however many are attached.

use crate::models::ChangeEvent;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Default number of events buffered before publishers are rejected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Publishing side of the change event queue.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::Sender<ChangeEvent>,
    receiver: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>,
}

/// A member of the consumer group.
#[derive(Clone)]
pub struct EventConsumer {
    receiver: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>,
}

impl EventQueue {
    /// Creates a new queue with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Publishes an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the queue is full or closed.
    pub fn publish(&self, event: ChangeEvent) -> Result<()> {
        let event_type = event.event_type();
        match self.sender.try_send(event) {
            Ok(()) => {
                metrics::counter!("event_queue_published_total", "event" => event_type)
                    .increment(1);
                Ok(())
            },
            Err(e) => {
                metrics::counter!("event_queue_dropped_total", "event" => event_type).increment(1);
                Err(Error::unavailable("publish_event", e))
            },
        }
    }

    /// Publishes an event, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the channel has been closed.
    pub async fn publish_wait(&self, event: ChangeEvent) -> Result<()> {
        let event_type = event.event_type();
        self.sender
            .send(event)
            .await
            .map_err(|e| Error::unavailable("publish_event", e))?;
        metrics::counter!("event_queue_published_total", "event" => event_type).increment(1);
        Ok(())
    }

    /// Attaches a consumer to the group.
    #[must_use]
    pub fn consumer(&self) -> EventConsumer {
        EventConsumer {
            receiver: Arc::clone(&self.receiver),
        }
    }

    /// Returns the number of events waiting to be consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Returns true if no event is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventConsumer {
    /// Receives the next event, or `None` once the queue is closed and drained.
    ///
    /// The queue closes when every [`EventQueue`] handle has been dropped.
    pub async fn recv(&self) -> Option<ChangeEvent> {
        self.receiver.lock().await.recv().await
    }
}
