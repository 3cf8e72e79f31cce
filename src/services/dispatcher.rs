//! Change event dispatcher.
//!
//! The dispatcher drains the [`EventQueue`] and keeps the index current.
//!
//! # Event Flow
//!
//! ```text
//! EventQueue --[consumer]--> ChangeDispatcher --[direct action]--> Indexer
//!                                   |
//!                                   v
//!                            SpaceDebouncer --[quiet for delay]--> Indexer::index_space
//! ```
//!
//! Trash, restore and move are applied to the index right away so search
//! results reflect them without waiting for the debounce window. Every
//! event, including those, also schedules a re-index of the affected space,
//! which picks up content changes the direct actions do not express.
//!
//! Per-event errors are logged and the event is dropped. Redelivery is left
//! to the event source and the re-index backstop.

use super::debouncer::{DebounceCallback, SpaceDebouncer};
use super::indexer::Indexer;
use crate::events::{EventConsumer, EventQueue};
use crate::models::{ChangeEvent, SpaceId};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Routes change events to the indexer.
pub struct ChangeDispatcher {
    indexer: Arc<Indexer>,
    debouncer: SpaceDebouncer,
    settle: Duration,
}

impl ChangeDispatcher {
    /// Creates a dispatcher using an existing debouncer.
    ///
    /// `settle` is how long each event waits before it is handled, giving
    /// storage time to settle.
    #[must_use]
    pub const fn new(indexer: Arc<Indexer>, debouncer: SpaceDebouncer, settle: Duration) -> Self {
        Self {
            indexer,
            debouncer,
            settle,
        }
    }

    /// Creates a dispatcher whose debouncer re-indexes spaces with `indexer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when called outside a tokio runtime.
    pub fn with_reindex(indexer: Arc<Indexer>, debounce: Duration, settle: Duration) -> Result<Self> {
        let reindexer = Arc::clone(&indexer);
        let callback: DebounceCallback = Arc::new(move |space, user| {
            if let Err(e) = reindexer.index_space(space, user) {
                tracing::error!(space_id = %space, error = %e, "Failed to index space");
            }
        });
        let debouncer = SpaceDebouncer::new(debounce, callback)?;
        Ok(Self::new(indexer, debouncer, settle))
    }

    /// Returns the debouncer scheduling space re-indexes.
    #[must_use]
    pub const fn debouncer(&self) -> &SpaceDebouncer {
        &self.debouncer
    }

    /// Spawns `workers` consumers of `queue` on the current runtime.
    ///
    /// Each event is handled by exactly one worker. The tasks finish once
    /// every [`EventQueue`] handle has been dropped and the queue is drained.
    pub fn start(self: &Arc<Self>, queue: &EventQueue, workers: usize) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                let consumer = queue.consumer();
                tokio::spawn(async move {
                    tracing::debug!(worker, "Change dispatcher worker started");
                    dispatcher.run(consumer).await;
                })
            })
            .collect()
    }

    /// Handles events from `consumer` until the queue is closed.
    pub async fn run(&self, consumer: EventConsumer) {
        while let Some(event) = consumer.recv().await {
            self.handle_event(event).await;
        }
        tracing::info!("Event queue closed, change dispatcher shutting down");
    }

    /// Handles a single event.
    pub async fn handle_event(&self, event: ChangeEvent) {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let event_type = event.event_type();
        metrics::counter!("dispatcher_events_total", "event" => event_type).increment(1);

        let indexer = Arc::clone(&self.indexer);
        let action = event.clone();
        let result = tokio::task::spawn_blocking(move || apply_direct_action(&indexer, &action))
            .await
            .map_err(|e| Error::operation("handle_event", e))
            .and_then(|result| result);

        match result {
            Ok(()) => {},
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    event_type,
                    event_id = %event.meta().event_id,
                    error = %e,
                    "Resource vanished before the event was handled, dropping"
                );
            },
            Err(e) => {
                metrics::counter!("dispatcher_events_failed_total", "event" => event_type)
                    .increment(1);
                tracing::error!(
                    event_type,
                    event_id = %event.meta().event_id,
                    error = %e,
                    "Failed to apply change event"
                );
            },
        }

        self.debouncer
            .debounce(&affected_space(&event), event.executant());
    }
}

/// Applies the index mutation an event maps to directly, if any.
fn apply_direct_action(indexer: &Indexer, event: &ChangeEvent) -> Result<()> {
    match event {
        ChangeEvent::ItemTrashed { id, .. } => indexer.trash_item(id),
        ChangeEvent::ItemRestored {
            reference,
            executant,
            ..
        } => indexer.restore_item(reference, executant),
        ChangeEvent::ItemMoved {
            reference,
            executant,
            ..
        } => indexer.move_item(reference, executant),
        ChangeEvent::ContainerCreated { .. }
        | ChangeEvent::FileUploaded { .. }
        | ChangeEvent::UploadReady { .. }
        | ChangeEvent::FileTouched { .. }
        | ChangeEvent::FileVersionRestored { .. }
        | ChangeEvent::TagsAdded { .. }
        | ChangeEvent::TagsRemoved { .. } => Ok(()),
    }
}

fn affected_space(event: &ChangeEvent) -> SpaceId {
    match event {
        ChangeEvent::ItemTrashed { id, .. } => id.space(),
        _ => event.space_id(),
    }
}
