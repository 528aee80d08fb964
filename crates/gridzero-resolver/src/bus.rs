//! Typed in-process event bus.
//!
//! A thin wrapper over a tokio broadcast channel. Components publish
//! immutable [`PipelineEvent`] records; consumers subscribe to everything or
//! to a set of [`EventKind`]s. Slow subscribers lose the oldest events
//! rather than applying back-pressure to the pipeline.

use std::collections::HashSet;

use gridzero_types::{EventKind, EventPublisher, PipelineEvent, constants};
use tokio::sync::broadcast;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Only events whose kind is in `kinds`.
    #[must_use]
    pub fn subscribe_kinds(&self, kinds: impl IntoIterator<Item = EventKind>) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(constants::EVENT_BUS_CAPACITY)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: PipelineEvent) {
        let kind = event.kind();
        if self.sender.send(event).is_err() {
            trace!(?kind, "event dropped, no subscribers");
        }
    }
}

/// A filtered view of the bus.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<PipelineEvent>,
    kinds: HashSet<EventKind>,
}

impl EventSubscription {
    /// Next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
