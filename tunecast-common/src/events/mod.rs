//! Event types for the tunecast event system
//!
//! Provides shared event definitions and the EventBus used by the player.

mod playback_types;

pub use playback_types::{PlaybackPhase, QueueChangeTrigger};

use crate::ContextId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Tunecast event types
///
/// Events are broadcast via EventBus. Every event carries the context it
/// belongs to; contexts never observe each other's events unless a
/// subscriber filters them together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TunecastEvent {
    /// Playback state machine moved between phases
    PhaseChanged {
        context: ContextId,
        old_phase: PlaybackPhase,
        new_phase: PlaybackPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track handed to the voice transport
    TrackStarted {
        context: ContextId,
        title: String,
        url: String,
        /// Start offset in seconds (non-zero after a filter change restart)
        offset_secs: f64,
        /// Whether this start is a restart of the same track
        restarted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track completed, skipped, or stopped for a restart
    TrackFinished {
        context: ContextId,
        url: String,
        /// Transport reported an error instead of a clean completion
        failed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        context: ContextId,
        queue_len: usize,
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch resolution progress
    BatchProgress {
        context: ContextId,
        processed: usize,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current item could not be played (engine advanced past it)
    PlaybackFailed {
        context: ContextId,
        url: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TunecastEvent {
    /// Context this event belongs to
    pub fn context(&self) -> ContextId {
        match self {
            TunecastEvent::PhaseChanged { context, .. }
            | TunecastEvent::TrackStarted { context, .. }
            | TunecastEvent::TrackFinished { context, .. }
            | TunecastEvent::QueueChanged { context, .. }
            | TunecastEvent::BatchProgress { context, .. }
            | TunecastEvent::PlaybackFailed { context, .. } => *context,
        }
    }
}

/// Broadcast bus for tunecast events
///
/// Lagging subscribers lose old events; emitting never blocks.
pub struct EventBus {
    tx: broadcast::Sender<TunecastEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TunecastEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TunecastEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(TunecastEvent::BatchProgress {
            context: ContextId(9),
            processed: 10,
            total: 30,
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.context(), ContextId(9));
        assert!(matches!(
            event,
            TunecastEvent::BatchProgress { processed: 10, total: 30, .. }
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.emit_lossy(TunecastEvent::QueueChanged {
            context: ContextId(1),
            queue_len: 0,
            trigger: QueueChangeTrigger::Clear,
            timestamp: chrono::Utc::now(),
        });
        assert!(bus.subscribe().try_recv().is_err());
    }
}
