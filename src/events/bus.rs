//! EventBus - broadcast distribution of judge events
//!
//! # Design
//!
//! - `tokio::sync::broadcast` for multi-producer, multi-consumer
//! - Non-blocking emit (fire-and-forget)
//! - Lagging receivers drop old events (no backpressure)
//! - Clone shares the channel

use super::JudgeEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity for the event bus channel
pub const DEFAULT_CAPACITY: usize = 1024;

/// Central event bus
///
/// # Example
///
/// ```rust,ignore
/// let bus = EventBus::new(1024);
/// let mut rx = bus.subscribe();
/// bus.emit(JudgeEvent::dispatch_failed(7, "oracle unavailable"));
/// let event = rx.recv().await?;
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<JudgeEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Emit an event to all subscribers; dropped when nobody listens
    pub fn emit(&self, event: JudgeEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<JudgeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
