use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{Event, EventEnvelope};

/// Envelopes buffered per subscriber before it starts lagging.
const DEFAULT_CAPACITY: usize = 1000;

/// Fan-out of lifecycle events to any number of in-process listeners.
///
/// Publishing never blocks. Slow subscribers lag and lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    /// Total envelopes published, delivered or not.
    published: Arc<AtomicUsize>,
}

impl EventBus {
    /// A bus buffering up to 1000 envelopes per subscriber.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` must be non-zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many subscribers received the envelope. Zero means it was dropped.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Wraps `event` in a fresh envelope and publishes it.
    pub fn emit(&self, event: Event) -> usize {
        tracing::trace!(event = event.name(), "Publishing event");
        self.publish(EventEnvelope::new(event))
    }

    /// Receives every envelope published from now on. Earlier ones are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Receivers currently alive, across all clones of the bus.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Envelopes published since the bus was created, including dropped ones.
    pub fn event_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
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
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}
